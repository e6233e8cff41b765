use std::sync::{
  atomic::{AtomicU8, Ordering},
  Arc,
};

use super::Cancellable;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

/// Shared state of one submission, observed by both the scheduler running
/// the work and whoever holds the cancel side.
///
/// The work starts at most once: [`begin`](TaskHandle::begin) and
/// [`cancel`](Cancellable::cancel) race on the same transition out of the
/// pending state, so exactly one of them wins. Cancelling work that already
/// started has no effect.
#[derive(Clone)]
pub struct TaskHandle(Arc<AtomicU8>);

impl Default for TaskHandle {
  fn default() -> Self { Self::new() }
}

impl TaskHandle {
  pub fn new() -> Self { Self(Arc::new(AtomicU8::new(PENDING))) }

  /// A handle for work that already ran to completion.
  pub fn finished() -> Self { Self(Arc::new(AtomicU8::new(FINISHED))) }

  #[inline]
  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Acquire) == CANCELLED }

  #[inline]
  pub fn is_finished(&self) -> bool { self.0.load(Ordering::Acquire) == FINISHED }

  /// Whether the work can no longer run.
  #[inline]
  pub fn is_closed(&self) -> bool { self.0.load(Ordering::Acquire) >= FINISHED }

  /// Claim the right to run the work. Returns `false` when it was cancelled
  /// first; calling it again while running keeps returning `true`.
  pub(crate) fn begin(&self) -> bool {
    match self
      .0
      .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
    {
      Ok(_) => true,
      Err(state) => state == RUNNING,
    }
  }

  #[inline]
  pub(crate) fn mark_finished(&self) { self.0.store(FINISHED, Ordering::Release); }
}

impl Cancellable for TaskHandle {
  fn cancel(&self) -> bool {
    self
      .0
      .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }
}
