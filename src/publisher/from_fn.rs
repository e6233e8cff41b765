use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use parking_lot::Mutex;

use super::{Publisher, ScalarSupplier};
use crate::{
  backpressure::validate_request,
  subscriber::Subscriber,
  subscription::{EmptySubscription, Subscription, SubscriptionHandle},
};

/// Creates a publisher that calls `f` for every subscriber and emits its
/// outcome: the value followed by completion, only completion for `None`,
/// or the error.
///
/// The value waits for demand; completion and errors do not.
pub fn from_fn<F, Item, Err>(f: F) -> FromFn<Item, Err>
where
  F: Fn() -> Result<Option<Item>, Err> + Send + Sync + 'static,
  Item: 'static,
  Err: 'static,
{
  FromFn(Arc::new(f))
}

/// Emits a clone of `value` to every subscriber, then completes.
pub fn just<Item, Err>(value: Item) -> FromFn<Item, Err>
where
  Item: Clone + Send + Sync + 'static,
  Err: 'static,
{
  from_fn(move || Ok(Some(value.clone())))
}

/// Completes every subscriber without emitting anything.
pub fn empty<Item: 'static, Err: 'static>() -> FromFn<Item, Err> { from_fn(|| Ok(None)) }

/// Fails every subscriber with a clone of `err`.
pub fn throw_err<Item, Err>(err: Err) -> FromFn<Item, Err>
where
  Item: 'static,
  Err: Clone + Send + Sync + 'static,
{
  from_fn(move || Err(err.clone()))
}

pub struct FromFn<Item, Err>(ScalarSupplier<Item, Err>);

impl<Item, Err> Clone for FromFn<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> Publisher<Item, Err> for FromFn<Item, Err>
where
  Item: Send + 'static,
  Err: 'static,
{
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<Item, Err>>) {
    match (self.0)() {
      Ok(Some(value)) => {
        let subscription = ScalarSubscription {
          value: Mutex::new(Some(value)),
          actual: Mutex::new(Some(subscriber.clone())),
          cancelled: AtomicBool::new(false),
        };
        subscriber.on_subscribe(SubscriptionHandle::plain(subscription));
      }
      Ok(None) => EmptySubscription::complete(&*subscriber),
      Err(err) => EmptySubscription::error(&*subscriber, err),
    }
  }

  fn scalar_supplier(&self) -> Option<ScalarSupplier<Item, Err>> { Some(self.0.clone()) }
}

/// Holds a single value until the first request.
struct ScalarSubscription<Item, Err> {
  value: Mutex<Option<Item>>,
  /// Released once the value went out or on cancel.
  actual: Mutex<Option<Arc<dyn Subscriber<Item, Err>>>>,
  cancelled: AtomicBool,
}

impl<Item: Send, Err> Subscription for ScalarSubscription<Item, Err> {
  fn request(&self, n: u64) {
    if !validate_request(n) || self.cancelled.load(Ordering::Acquire) {
      return;
    }
    let value = self.value.lock().take();
    let actual = self.actual.lock().clone();
    if let (Some(value), Some(actual)) = (value, actual) {
      actual.on_next(value);
      if !self.cancelled.load(Ordering::Acquire) && self.actual.lock().take().is_some() {
        actual.on_complete();
      }
    }
  }

  fn cancel(&self) {
    self.cancelled.store(true, Ordering::Release);
    self.value.lock().take();
    self.actual.lock().take();
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{error::FlowError, testing::TestSubscriber};

  #[test]
  fn just_waits_for_demand() {
    let subscriber = TestSubscriber::<i32, FlowError>::new(0);
    just::<_, FlowError>(7).subscribe(subscriber.clone());
    assert!(subscriber.values().is_empty());
    subscriber.request(1);
    assert_eq!(subscriber.values(), vec![7]);
    assert!(subscriber.is_completed());
    subscriber.request(1);
    assert_eq!(subscriber.values(), vec![7]);
    assert_eq!(subscriber.completion_count(), 1);
  }

  #[test]
  fn empty_and_error_do_not_wait() {
    let subscriber = TestSubscriber::<i32, FlowError>::new(0);
    empty::<i32, FlowError>().subscribe(subscriber.clone());
    assert!(subscriber.is_completed());

    let subscriber = TestSubscriber::<i32, FlowError>::new(0);
    throw_err::<i32, _>(FlowError::Upstream("boom".into())).subscribe(subscriber.clone());
    assert_eq!(subscriber.error(), Some(FlowError::Upstream("boom".into())));
  }

  #[test]
  fn subscriber_is_released_after_completion() {
    let subscriber = TestSubscriber::<i32, FlowError>::new(1);
    just::<_, FlowError>(1).subscribe(subscriber.clone());
    assert!(subscriber.is_completed());

    let weak = Arc::downgrade(&subscriber);
    drop(subscriber);
    assert!(weak.upgrade().is_none());
  }

  #[test]
  fn supplier_is_exposed() {
    let source = just::<_, FlowError>(3);
    let supplier = Publisher::<i32, FlowError>::scalar_supplier(&source).unwrap();
    assert_eq!(supplier(), Ok(Some(3)));
  }
}
