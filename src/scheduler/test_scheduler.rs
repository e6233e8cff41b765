//! Manual scheduler for deterministic tests.
//!
//! Submissions are queued instead of being executed. The test decides when
//! (and on which thread) they run, which makes it possible to interleave
//! upstream signals, demand and cancellation precisely.
//!
//! ```rust
//! use std::sync::{
//!   atomic::{AtomicUsize, Ordering},
//!   Arc,
//! };
//! use rxflow::scheduler::{Scheduler, TestScheduler};
//!
//! let scheduler = TestScheduler::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let c_hits = hits.clone();
//! scheduler.submit(Arc::new(move || {
//!   c_hits.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! assert_eq!(scheduler.pending_count(), 1);
//! assert_eq!(hits.load(Ordering::SeqCst), 0);
//! scheduler.flush();
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::{CancelHandle, Runnable, Scheduler, TaskHandle};

#[derive(Default)]
struct TestSchedulerState {
  queue: VecDeque<(Arc<dyn Runnable>, TaskHandle)>,
  handles: Vec<TaskHandle>,
}

/// A scheduler whose submissions only run when the test asks for it.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct TestScheduler(Arc<Mutex<TestSchedulerState>>);

impl TestScheduler {
  pub fn new() -> Self { Self::default() }

  /// Number of queued submissions that were not cancelled.
  pub fn pending_count(&self) -> usize {
    self
      .0
      .lock()
      .queue
      .iter()
      .filter(|(_, h)| !h.is_cancelled())
      .count()
  }

  /// Total number of submissions so far.
  pub fn submitted_count(&self) -> usize { self.0.lock().handles.len() }

  /// Number of submissions cancelled through their handle.
  pub fn cancelled_count(&self) -> usize {
    self
      .0
      .lock()
      .handles
      .iter()
      .filter(|h| h.is_cancelled())
      .count()
  }

  /// Run the oldest submission that is still live. Cancelled submissions in
  /// front of it are discarded. Returns `false` when nothing was run.
  pub fn run_next(&self) -> bool {
    loop {
      let next = self.0.lock().queue.pop_front();
      let Some((work, handle)) = next else {
        return false;
      };
      if !handle.begin() {
        continue;
      }
      work.run();
      handle.mark_finished();
      return true;
    }
  }

  /// Run submissions until the queue is empty, including the ones submitted
  /// while flushing. Returns how many ran.
  pub fn flush(&self) -> usize {
    let mut ran = 0;
    while self.run_next() {
      ran += 1;
    }
    ran
  }
}

impl Scheduler for TestScheduler {
  fn submit(&self, work: Arc<dyn Runnable>) -> CancelHandle {
    let handle = TaskHandle::new();
    let mut state = self.0.lock();
    state.queue.push_back((work, handle.clone()));
    state.handles.push(handle.clone());
    Box::new(handle)
  }
}
