use std::{sync::Arc, thread};

use super::{CancelHandle, Runnable, Scheduler, TaskHandle};

/// Spawns a new OS thread for each submission.
#[derive(Debug, Clone, Default)]
pub struct NewThreadScheduler {
  name: Option<String>,
}

impl NewThreadScheduler {
  pub fn new() -> Self { Self::default() }

  /// Name given to every spawned thread.
  pub fn named(name: impl Into<String>) -> Self { Self { name: Some(name.into()) } }
}

impl Scheduler for NewThreadScheduler {
  fn submit(&self, work: Arc<dyn Runnable>) -> CancelHandle {
    let handle = TaskHandle::new();
    let c_handle = handle.clone();
    let task = move || {
      if c_handle.begin() {
        work.run();
        c_handle.mark_finished();
      }
    };

    let mut builder = thread::Builder::new();
    if let Some(name) = &self.name {
      builder = builder.name(name.clone());
    }
    if let Err(err) = builder.spawn(task) {
      tracing::warn!(%err, "failed to spawn a scheduler thread, work dropped");
      handle.mark_finished();
    }
    Box::new(handle)
  }
}
