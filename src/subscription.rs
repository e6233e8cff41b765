//! Subscription side of the demand protocol.
//!
//! A [`Subscription`] is the handle a consumer uses to pull demand from, or
//! cancel, its producer. Some producers can also hand out their internal
//! container directly ([`QueueSubscription`]); such producers announce it
//! through the [`SubscriptionHandle::Fusable`] variant at subscribe time, so
//! the consumer never needs to inspect types at runtime.

use std::sync::Arc;

use crate::subscriber::Subscriber;

/// Demand value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

// ============================================================================
// Subscription
// ============================================================================

/// Handle linking a consumer to its producer.
pub trait Subscription: Send + Sync {
  /// Authorize the producer to emit `n` more values. `n` must be positive.
  fn request(&self, n: u64);

  /// Stop the flow. Calling it more than once has no further effect.
  fn cancel(&self);
}

// ============================================================================
// Queue fusion
// ============================================================================

/// Fusion modes, both as a request and as the outcome of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
  /// Fusion refused, values are pushed as usual.
  None,
  /// Every value is already available, `poll` never waits for the producer.
  Sync,
  /// Values arrive over time; `on_next` only announces them.
  Async,
  /// Request only: accept whichever of `Sync` or `Async` the producer offers.
  Any,
}

impl FusionMode {
  /// Whether a producer offering `offered` may grant it for this request.
  #[inline]
  pub fn accepts(self, offered: FusionMode) -> bool {
    match (self, offered) {
      (_, FusionMode::None) | (_, FusionMode::Any) => false,
      (FusionMode::Any, _) => true,
      (requested, offered) => requested == offered,
    }
  }
}

/// A subscription that can also be drained directly by its consumer.
pub trait QueueSubscription<Item>: Subscription {
  /// Negotiate a fusion mode. Returns the granted mode, never `Any`.
  fn request_fusion(&self, mode: FusionMode) -> FusionMode;

  /// Take the next value, if one is available.
  fn poll(&self) -> Option<Item>;

  fn is_empty(&self) -> bool;

  /// Drop every available value.
  fn clear(&self);
}

/// What a producer hands to its consumer in `on_subscribe`.
pub enum SubscriptionHandle<Item> {
  Plain(Arc<dyn Subscription>),
  Fusable(Arc<dyn QueueSubscription<Item>>),
}

impl<Item> SubscriptionHandle<Item> {
  #[inline]
  pub fn plain(subscription: impl Subscription + 'static) -> Self {
    SubscriptionHandle::Plain(Arc::new(subscription))
  }

  #[inline]
  pub fn is_fusable(&self) -> bool { matches!(self, SubscriptionHandle::Fusable(_)) }
}

impl<Item> Clone for SubscriptionHandle<Item> {
  fn clone(&self) -> Self {
    match self {
      SubscriptionHandle::Plain(s) => SubscriptionHandle::Plain(s.clone()),
      SubscriptionHandle::Fusable(s) => SubscriptionHandle::Fusable(s.clone()),
    }
  }
}

impl<Item> Subscription for SubscriptionHandle<Item> {
  #[inline]
  fn request(&self, n: u64) {
    match self {
      SubscriptionHandle::Plain(s) => s.request(n),
      SubscriptionHandle::Fusable(s) => s.request(n),
    }
  }

  #[inline]
  fn cancel(&self) {
    match self {
      SubscriptionHandle::Plain(s) => s.cancel(),
      SubscriptionHandle::Fusable(s) => s.cancel(),
    }
  }
}

// ============================================================================
// Empty subscription
// ============================================================================

/// A subscription with nothing behind it, used right before a terminal
/// signal that does not depend on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
  fn request(&self, _n: u64) {}

  fn cancel(&self) {}
}

impl EmptySubscription {
  /// Subscribe `subscriber` to nothing and complete it right away.
  pub fn complete<Item, Err>(subscriber: &dyn Subscriber<Item, Err>) {
    subscriber.on_subscribe(SubscriptionHandle::plain(EmptySubscription));
    subscriber.on_complete();
  }

  /// Subscribe `subscriber` to nothing and fail it right away.
  pub fn error<Item, Err>(subscriber: &dyn Subscriber<Item, Err>, err: Err) {
    subscriber.on_subscribe(SubscriptionHandle::plain(EmptySubscription));
    subscriber.on_error(err);
  }
}
