//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Errors
pub use crate::error::FlowError;
// Operators
pub use crate::ops::observe_on::{ObserveOn, ObserveOnConfig, DEFAULT_PREFETCH};
// Sources
pub use crate::publisher::{self, Publisher, PublisherExt};
// Queues
pub use crate::queue::{BoundedQueue, Queue, QueueFactory, UnboundedQueue};
// Schedulers
#[cfg(feature = "futures-scheduler")]
pub use crate::scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use crate::scheduler::TokioScheduler;
pub use crate::scheduler::{
  CancelHandle, Cancellable, ImmediateScheduler, NewThreadScheduler, Runnable, Scheduler,
  TaskHandle,
};
// Protocol
pub use crate::subscriber::Subscriber;
pub use crate::subscription::{
  FusionMode, QueueSubscription, Subscription, SubscriptionHandle, UNBOUNDED,
};
// Test doubles
pub use crate::testing::{TestScheduler, TestSubscriber};
