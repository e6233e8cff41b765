//! Execution contexts.
//!
//! A [`Scheduler`] takes a unit of work and starts executing it according to
//! its own policy (caller thread, new thread, thread pool, async runtime).
//! Submitting returns a [`CancelHandle`] that makes a best effort to stop
//! that particular submission.
//!
//! ```rust
//! use std::sync::{
//!   atomic::{AtomicUsize, Ordering},
//!   Arc,
//! };
//! use rxflow::scheduler::{ImmediateScheduler, Scheduler};
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let c_hits = hits.clone();
//! let _handle = ImmediateScheduler.submit(Arc::new(move || {
//!   c_hits.fetch_add(1, Ordering::SeqCst);
//! }));
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```
use std::sync::Arc;

mod cancellable_work;
mod immediate;
mod indexed_cancellable;
mod task_handle;
pub mod test_scheduler;
mod thread_scheduler;
#[cfg(feature = "futures-scheduler")]
mod thread_pool_scheduler;
#[cfg(feature = "tokio-scheduler")]
mod tokio_scheduler;

pub use cancellable_work::CancellableWork;
pub use immediate::ImmediateScheduler;
pub(crate) use indexed_cancellable::{Install, TaskSlot};
pub use task_handle::TaskHandle;
pub use test_scheduler::TestScheduler;
pub use thread_scheduler::NewThreadScheduler;
#[cfg(feature = "futures-scheduler")]
pub use thread_pool_scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use tokio_scheduler::TokioScheduler;

/// A unit of work that may be submitted many times.
pub trait Runnable: Send + Sync {
  fn run(&self);
}

impl<F> Runnable for F
where
  F: Fn() + Send + Sync,
{
  #[inline]
  fn run(&self) { self() }
}

/// Best-effort cancellation of one submission.
pub trait Cancellable: Send + Sync {
  /// Returns `true` only when the work is guaranteed never to start.
  fn cancel(&self) -> bool;
}

pub type CancelHandle = Box<dyn Cancellable>;

impl Cancellable for () {
  #[inline]
  fn cancel(&self) -> bool { false }
}

/// Starts the execution of submitted work.
pub trait Scheduler: Send + Sync {
  fn submit(&self, work: Arc<dyn Runnable>) -> CancelHandle;
}

/// Any function from work to a cancel handle is a scheduler.
impl<F> Scheduler for F
where
  F: Fn(Arc<dyn Runnable>) -> CancelHandle + Send + Sync,
{
  #[inline]
  fn submit(&self, work: Arc<dyn Runnable>) -> CancelHandle { self(work) }
}
