use std::{
  iter::Peekable,
  marker::PhantomData,
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use super::Publisher;
use crate::{
  backpressure::{get_and_add_cap, validate_request},
  subscriber::Subscriber,
  subscription::{FusionMode, QueueSubscription, Subscription, SubscriptionHandle, UNBOUNDED},
};

/// Creates a publisher that emits the items of `iter`, one per unit of
/// demand, then completes.
///
/// The subscription it hands out supports synchronous fusion: a consumer may
/// pull the items directly instead of requesting them.
pub fn from_iter<I>(iter: I) -> FromIter<I>
where
  I: IntoIterator + Clone,
{
  FromIter(iter)
}

#[derive(Clone)]
pub struct FromIter<I>(I);

impl<I, Err> Publisher<I::Item, Err> for FromIter<I>
where
  I: IntoIterator + Clone,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
  Err: 'static,
{
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<I::Item, Err>>) {
    let subscription = Arc::new(IterSubscription {
      iter: Mutex::new(Some(self.0.clone().into_iter().peekable())),
      actual: Mutex::new(Some(subscriber.clone())),
      requested: AtomicU64::new(0),
      cancelled: AtomicBool::new(false),
      fused: AtomicBool::new(false),
      _err: PhantomData,
    });
    subscriber.on_subscribe(SubscriptionHandle::Fusable(subscription.clone()));
    if subscription.fused.load(Ordering::Acquire) {
      // The consumer pulls from now on, it is never pushed to.
      subscription.release();
    }
  }
}

struct IterSubscription<It: Iterator, Err> {
  iter: Mutex<Option<Peekable<It>>>,
  actual: Mutex<Option<Arc<dyn Subscriber<It::Item, Err>>>>,
  requested: AtomicU64,
  cancelled: AtomicBool,
  fused: AtomicBool,
  _err: PhantomData<fn() -> Err>,
}

impl<It: Iterator, Err> IterSubscription<It, Err> {
  fn next_item(&self) -> Option<It::Item> { self.iter.lock().as_mut().and_then(|it| it.next()) }

  fn exhausted(&self) -> bool {
    let mut iter = self.iter.lock();
    iter.as_mut().map_or(true, |it| it.peek().is_none())
  }

  /// Drop the subscriber so no reference cycle outlives the stream.
  fn release(&self) -> Option<Arc<dyn Subscriber<It::Item, Err>>> { self.actual.lock().take() }

  fn complete(&self) {
    if let Some(actual) = self.release() {
      actual.on_complete();
    }
  }

  fn emit(&self, mut requested: u64) {
    let Some(actual) = self.actual.lock().clone() else {
      return;
    };
    let mut emitted = 0;
    loop {
      while emitted != requested {
        if self.cancelled.load(Ordering::Acquire) {
          return;
        }
        match self.next_item() {
          Some(v) => {
            actual.on_next(v);
            emitted += 1;
          }
          None => {
            if !self.cancelled.load(Ordering::Acquire) {
              self.complete();
            }
            return;
          }
        }
      }
      if self.cancelled.load(Ordering::Acquire) {
        return;
      }
      if self.exhausted() {
        self.complete();
        return;
      }
      if requested == UNBOUNDED {
        continue;
      }
      requested = self.requested.load(Ordering::Acquire);
      if requested == emitted {
        requested = self.requested.fetch_sub(emitted, Ordering::AcqRel) - emitted;
        if requested == 0 {
          return;
        }
        emitted = 0;
      }
    }
  }
}

impl<It, Err> Subscription for IterSubscription<It, Err>
where
  It: Iterator + Send,
  It::Item: Send,
{
  fn request(&self, n: u64) {
    if self.fused.load(Ordering::Acquire) || !validate_request(n) {
      return;
    }
    if get_and_add_cap(&self.requested, n) == 0 {
      self.emit(self.requested.load(Ordering::Acquire));
    }
  }

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      self.release();
    }
  }
}

impl<It, Err> QueueSubscription<It::Item> for IterSubscription<It, Err>
where
  It: Iterator + Send,
  It::Item: Send,
{
  fn request_fusion(&self, mode: FusionMode) -> FusionMode {
    if mode.accepts(FusionMode::Sync) {
      self.fused.store(true, Ordering::Release);
      FusionMode::Sync
    } else {
      FusionMode::None
    }
  }

  fn poll(&self) -> Option<It::Item> { self.next_item() }

  fn is_empty(&self) -> bool { self.exhausted() }

  fn clear(&self) { self.iter.lock().take(); }
}
