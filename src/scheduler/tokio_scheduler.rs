use std::sync::Arc;

use futures::future;
use tokio::{runtime::Handle, task::AbortHandle};

use super::{CancelHandle, Cancellable, CancellableWork, Runnable, Scheduler, TaskHandle};

/// Worker adapter spawning each submission as a task on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
  handle: Handle,
}

impl TokioScheduler {
  pub fn new(handle: Handle) -> Self { Self { handle } }

  /// Use the runtime the caller is running in.
  ///
  /// Returns `None` outside of a tokio runtime.
  pub fn current() -> Option<Self> { Handle::try_current().ok().map(Self::new) }
}

struct TokioTask {
  state: TaskHandle,
  abort: AbortHandle,
}

impl Cancellable for TokioTask {
  fn cancel(&self) -> bool {
    let stopped = self.state.cancel();
    if stopped {
      self.abort.abort();
    }
    stopped
  }
}

impl Scheduler for TokioScheduler {
  fn submit(&self, work: Arc<dyn Runnable>) -> CancelHandle {
    let state = TaskHandle::new();
    let task = CancellableWork::new(future::lazy(move |_| work.run()), state.clone());
    let join = self.handle.spawn(task);
    Box::new(TokioTask { state, abort: join.abort_handle() })
  }
}
