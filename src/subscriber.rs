//! Consumer side of the demand protocol.

use crate::subscription::SubscriptionHandle;

/// The consumer of a demand-regulated stream.
///
/// Signals follow the usual grammar: exactly one `on_subscribe`, then any
/// number of `on_next` bounded by the demand requested through the
/// subscription, then at most one of `on_error` or `on_complete`. Signals are
/// never delivered concurrently to the same subscriber, but successive
/// signals may come from different threads, hence `Send + Sync` and `&self`.
pub trait Subscriber<Item, Err>: Send + Sync {
  fn on_subscribe(&self, subscription: SubscriptionHandle<Item>);

  fn on_next(&self, value: Item);

  fn on_error(&self, err: Err);

  fn on_complete(&self);
}
