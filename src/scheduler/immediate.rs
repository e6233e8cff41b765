use std::sync::Arc;

use super::{CancelHandle, Runnable, Scheduler, TaskHandle};

/// Runs submitted work right away on the submitting thread.
///
/// Useful to keep a pipeline synchronous, e.g. in tests. The returned handle
/// is always finished, so cancelling it has no effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
  fn submit(&self, work: Arc<dyn Runnable>) -> CancelHandle {
    work.run();
    Box::new(TaskHandle::finished())
  }
}
