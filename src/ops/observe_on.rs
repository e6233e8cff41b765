//! Moves the delivery of a stream onto a [`Scheduler`] while keeping
//! demand flowing end to end.
//!
//! Values arriving from upstream are buffered (up to `prefetch` of them) and
//! drained on the scheduler. Downstream demand is honoured exactly, and
//! upstream is only asked for more once buffered values have been handed
//! over.

use std::{marker::PhantomData, sync::Arc};

use super::scheduled_scalar::ScheduledScalar;
use crate::{
  error::FlowError,
  publisher::Publisher,
  queue::{self, QueueFactory},
  scheduler::Scheduler,
  subscriber::Subscriber,
};

mod subscriber;

use subscriber::ObserveOnSubscriber;

/// Prefetch used when none is configured.
pub const DEFAULT_PREFETCH: usize = 256;

/// Tuning of an [`ObserveOn`] operator.
///
/// ```rust
/// use rxflow::ops::observe_on::ObserveOnConfig;
///
/// let config = ObserveOnConfig::default().delay_error(true).prefetch(32);
/// assert!(config.validate().is_ok());
/// assert!(ObserveOnConfig::default().prefetch(0).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOnConfig {
  /// Deliver an upstream failure only after every buffered value.
  pub delay_error: bool,
  /// How many values are requested from upstream ahead of downstream
  /// demand. `usize::MAX` requests without limit.
  pub prefetch: usize,
}

impl Default for ObserveOnConfig {
  fn default() -> Self { Self { delay_error: false, prefetch: DEFAULT_PREFETCH } }
}

impl ObserveOnConfig {
  #[must_use]
  pub fn delay_error(mut self, delay_error: bool) -> Self {
    self.delay_error = delay_error;
    self
  }

  #[must_use]
  pub fn prefetch(mut self, prefetch: usize) -> Self {
    self.prefetch = prefetch;
    self
  }

  pub fn validate(&self) -> Result<(), FlowError> {
    if self.prefetch == 0 {
      return Err(FlowError::InvalidPrefetch(self.prefetch));
    }
    Ok(())
  }
}

/// The operator returned by
/// [`PublisherExt::observe_on`](crate::publisher::PublisherExt::observe_on).
pub struct ObserveOn<P, Item, Err> {
  source: P,
  scheduler: Arc<dyn Scheduler>,
  delay_error: bool,
  prefetch: usize,
  queue_factory: QueueFactory<Item>,
  _err: PhantomData<fn() -> Err>,
}

impl<P, Item, Err> ObserveOn<P, Item, Err>
where
  Item: Send + 'static,
{
  /// Build the operator with the default configuration.
  pub fn new(source: P, scheduler: impl Scheduler + 'static) -> Self {
    Self {
      source,
      scheduler: Arc::new(scheduler),
      delay_error: false,
      prefetch: DEFAULT_PREFETCH,
      queue_factory: queue::for_prefetch(DEFAULT_PREFETCH),
      _err: PhantomData,
    }
  }

  pub fn with_config(
    source: P, scheduler: impl Scheduler + 'static, config: ObserveOnConfig,
  ) -> Result<Self, FlowError> {
    config.validate()?;
    Self::with_queue(
      source,
      scheduler,
      config.delay_error,
      config.prefetch,
      queue::for_prefetch(config.prefetch),
    )
  }

  /// Build the operator with an explicit buffer factory. The factory is
  /// called once per subscription whose upstream cannot be fused.
  pub fn with_queue(
    source: P, scheduler: impl Scheduler + 'static, delay_error: bool, prefetch: usize,
    queue_factory: QueueFactory<Item>,
  ) -> Result<Self, FlowError> {
    if prefetch == 0 {
      return Err(FlowError::InvalidPrefetch(prefetch));
    }
    Ok(Self {
      source,
      scheduler: Arc::new(scheduler),
      delay_error,
      prefetch,
      queue_factory,
      _err: PhantomData,
    })
  }

  /// Build the operator over a `futures` thread pool.
  #[cfg(feature = "futures-scheduler")]
  pub fn on_pool(
    source: P, pool: futures::executor::ThreadPool, config: ObserveOnConfig,
  ) -> Result<Self, FlowError> {
    Self::with_config(source, crate::scheduler::ThreadPoolScheduler::from_pool(pool), config)
  }

  #[inline]
  pub fn prefetch(&self) -> usize { self.prefetch }

  #[inline]
  pub fn is_delay_error(&self) -> bool { self.delay_error }
}

impl<P: Clone, Item, Err> Clone for ObserveOn<P, Item, Err> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      scheduler: self.scheduler.clone(),
      delay_error: self.delay_error,
      prefetch: self.prefetch,
      queue_factory: self.queue_factory.clone(),
      _err: PhantomData,
    }
  }
}

impl<P, Item, Err> Publisher<Item, Err> for ObserveOn<P, Item, Err>
where
  P: Publisher<Item, Err>,
  Item: Send + 'static,
  Err: From<FlowError> + Send + 'static,
{
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<Item, Err>>) {
    if let Some(supplier) = self.source.scalar_supplier() {
      tracing::trace!("observe_on: scalar source, scheduling its supplier");
      ScheduledScalar::subscribe(subscriber, supplier, self.scheduler.clone());
      return;
    }
    let parent = ObserveOnSubscriber::new(
      subscriber,
      self.scheduler.clone(),
      self.delay_error,
      self.prefetch,
      self.queue_factory.clone(),
    );
    self.source.subscribe(parent);
  }
}
