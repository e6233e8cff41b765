use std::sync::Arc;

use futures::{executor::ThreadPool, future};
use once_cell::sync::Lazy;

use super::{CancelHandle, CancellableWork, Runnable, Scheduler, TaskHandle};

/// Worker adapter turning a `futures` thread pool into a [`Scheduler`].
///
/// Every submission is spawned as its own task. Cancelling the returned
/// handle prevents a submission from running if the pool has not picked it
/// up yet; a submission already running finishes normally.
#[derive(Clone)]
pub struct ThreadPoolScheduler {
  pool: ThreadPool,
}

static SHARED_POOL: Lazy<std::io::Result<ThreadPool>> = Lazy::new(|| {
  ThreadPool::builder()
    .name_prefix("rxflow-shared-")
    .create()
});

impl ThreadPoolScheduler {
  /// A scheduler over the process-wide pool, built on first use.
  pub fn shared() -> std::io::Result<Self> {
    match &*SHARED_POOL {
      Ok(pool) => Ok(Self::from_pool(pool.clone())),
      Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
    }
  }

  /// Build a scheduler over a fresh pool with one thread per CPU.
  pub fn new() -> std::io::Result<Self> { ThreadPool::new().map(Self::from_pool) }

  /// Build a scheduler over a fresh pool of `size` threads.
  pub fn with_size(size: usize) -> std::io::Result<Self> {
    ThreadPool::builder()
      .pool_size(size)
      .name_prefix("rxflow-pool-")
      .create()
      .map(Self::from_pool)
  }

  pub fn from_pool(pool: ThreadPool) -> Self { Self { pool } }
}

impl From<ThreadPool> for ThreadPoolScheduler {
  fn from(pool: ThreadPool) -> Self { Self::from_pool(pool) }
}

impl Scheduler for ThreadPoolScheduler {
  fn submit(&self, work: Arc<dyn Runnable>) -> CancelHandle {
    let handle = TaskHandle::new();
    let task = future::lazy(move |_| work.run());
    self
      .pool
      .spawn_ok(CancellableWork::new(task, handle.clone()));
    Box::new(handle)
  }
}
