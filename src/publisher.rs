//! Producers of demand-regulated streams.

use std::sync::Arc;

use crate::{
  error::FlowError,
  ops::observe_on::{ObserveOn, ObserveOnConfig},
  scheduler::Scheduler,
  subscriber::Subscriber,
};

mod from_fn;
mod from_iter;

pub use from_fn::{empty, from_fn, just, throw_err, FromFn};
pub use from_iter::{from_iter, FromIter};

/// A synchronous, single-value computation a publisher may expose so that
/// scheduling operators can run it directly instead of subscribing.
///
/// `Ok(None)` means the publisher completes without a value.
pub type ScalarSupplier<Item, Err> = Arc<dyn Fn() -> Result<Option<Item>, Err> + Send + Sync>;

/// A producer of values that honours downstream demand.
pub trait Publisher<Item, Err> {
  /// Start a new, independent subscription for `subscriber`.
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<Item, Err>>);

  /// The supplier behind this publisher, when it produces at most one value
  /// synchronously.
  fn scalar_supplier(&self) -> Option<ScalarSupplier<Item, Err>> { None }
}

/// Operators available on every publisher.
pub trait PublisherExt<Item, Err>: Publisher<Item, Err> + Sized {
  /// Re-emit every signal of this publisher on `scheduler`, reading ahead
  /// with the default configuration.
  ///
  /// ```rust
  /// use rxflow::prelude::*;
  ///
  /// let scheduler = TestScheduler::new();
  /// let subscriber = TestSubscriber::<i32, FlowError>::new(UNBOUNDED);
  /// publisher::from_iter(1..=3)
  ///   .observe_on(scheduler.clone())
  ///   .subscribe(subscriber.clone());
  ///
  /// assert!(subscriber.values().is_empty());
  /// scheduler.flush();
  /// assert_eq!(subscriber.values(), vec![1, 2, 3]);
  /// assert!(subscriber.is_completed());
  /// ```
  fn observe_on(self, scheduler: impl Scheduler + 'static) -> ObserveOn<Self, Item, Err>
  where
    Item: Send + 'static,
  {
    ObserveOn::new(self, scheduler)
  }

  /// Same as [`observe_on`](PublisherExt::observe_on) with an explicit
  /// configuration.
  fn observe_on_with(
    self, scheduler: impl Scheduler + 'static, config: ObserveOnConfig,
  ) -> Result<ObserveOn<Self, Item, Err>, FlowError>
  where
    Item: Send + 'static,
  {
    ObserveOn::with_config(self, scheduler, config)
  }
}

impl<P, Item, Err> PublisherExt<Item, Err> for P where P: Publisher<Item, Err> {}
