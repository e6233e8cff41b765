//! # rxflow: thread-hopping with backpressure
//!
//! Demand-driven streams following the Reactive Streams protocol, and an
//! [`observe_on`](publisher::PublisherExt::observe_on) operator that moves
//! their delivery onto a scheduler without ever emitting more than the
//! consumer asked for.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use rxflow::prelude::*;
//!
//! let subscriber = TestSubscriber::<i32, FlowError>::new(UNBOUNDED);
//! publisher::from_iter(0..10)
//!   .observe_on(NewThreadScheduler::new())
//!   .subscribe(subscriber.clone());
//!
//! assert!(subscriber.await_terminal(Duration::from_secs(5)));
//! assert_eq!(subscriber.values(), (0..10).collect::<Vec<_>>());
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Produces values when asked to |
//! | [`Subscriber`] | Receives `on_subscribe`, `on_next`, `on_error` and `on_complete` |
//! | [`Subscription`] | Carries demand (`request`) and `cancel` back upstream |
//! | [`Scheduler`] | Runs submitted work, returning a cancel handle |
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): `ThreadPoolScheduler` over a `futures`
//!   thread pool
//! - **`tokio-scheduler`**: `TokioScheduler` over a tokio runtime handle
//!
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`Scheduler`]: scheduler::Scheduler

pub mod backpressure;
pub mod error;
pub mod ops;
pub mod prelude;
pub mod publisher;
pub mod queue;
pub mod scheduler;
pub mod subscriber;
pub mod subscription;
pub mod testing;

pub use prelude::*;
