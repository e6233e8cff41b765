#![allow(dead_code)]

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Once,
  },
  thread::{self, ThreadId},
};

use parking_lot::Mutex;
use rxflow::prelude::*;

pub fn init_test_logging() {
  static INIT: Once = Once::new();
  INIT.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

/// Upstream side of a [`ManualPublisher`] subscription: counts demand and
/// cancellation.
#[derive(Default)]
pub struct Recording {
  requested: Mutex<Vec<u64>>,
  cancelled: AtomicUsize,
}

impl Recording {
  pub fn requests(&self) -> Vec<u64> { self.requested.lock().clone() }

  pub fn total_requested(&self) -> u64 {
    self
      .requested
      .lock()
      .iter()
      .fold(0u64, |acc, n| acc.saturating_add(*n))
  }

  pub fn cancel_count(&self) -> usize { self.cancelled.load(Ordering::SeqCst) }
}

impl Subscription for Recording {
  fn request(&self, n: u64) { self.requested.lock().push(n); }

  fn cancel(&self) { self.cancelled.fetch_add(1, Ordering::SeqCst); }
}

struct ManualInner<Item, Err> {
  subscriber: Option<Arc<dyn Subscriber<Item, Err>>>,
  subscription: Arc<Recording>,
}

/// A publisher driven by hand from the test: it captures its subscriber and
/// lets the test push signals, ignoring demand entirely.
pub struct ManualPublisher<Item, Err>(Arc<Mutex<ManualInner<Item, Err>>>);

impl<Item, Err> Clone for ManualPublisher<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> Default for ManualPublisher<Item, Err> {
  fn default() -> Self {
    Self(Arc::new(Mutex::new(ManualInner {
      subscriber: None,
      subscription: Arc::new(Recording::default()),
    })))
  }
}

impl<Item, Err> ManualPublisher<Item, Err> {
  pub fn new() -> Self { Self::default() }

  pub fn upstream(&self) -> Arc<Recording> { self.0.lock().subscription.clone() }

  fn subscriber(&self) -> Arc<dyn Subscriber<Item, Err>> {
    match &self.0.lock().subscriber {
      Some(s) => s.clone(),
      None => panic!("nothing subscribed to the manual publisher"),
    }
  }

  pub fn next(&self, value: Item) { self.subscriber().on_next(value); }

  pub fn error(&self, err: Err) { self.subscriber().on_error(err); }

  pub fn complete(&self) { self.subscriber().on_complete(); }
}

impl<Item, Err> Publisher<Item, Err> for ManualPublisher<Item, Err> {
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<Item, Err>>) {
    let subscription = {
      let mut inner = self.0.lock();
      inner.subscriber = Some(subscriber.clone());
      inner.subscription.clone()
    };
    subscriber.on_subscribe(SubscriptionHandle::Plain(subscription));
  }
}

/// A publisher whose subscription offers a fixed fusion mode over a queue
/// the test fills by hand.
pub struct FusedPublisher(Arc<FusedSource>);

pub struct FusedSource {
  mode: FusionMode,
  queue: UnboundedQueue<i32>,
  requested: Mutex<Vec<u64>>,
  cancelled: AtomicUsize,
  cleared_on: Mutex<Vec<ThreadId>>,
  subscriber: Mutex<Option<Arc<dyn Subscriber<i32, FlowError>>>>,
}

impl FusedPublisher {
  pub fn new(mode: FusionMode, values: impl IntoIterator<Item = i32>) -> Self {
    let queue = UnboundedQueue::new();
    for v in values {
      let _ = queue.offer(v);
    }
    Self(Arc::new(FusedSource {
      mode,
      queue,
      requested: Mutex::new(vec![]),
      cancelled: AtomicUsize::new(0),
      cleared_on: Mutex::new(vec![]),
      subscriber: Mutex::new(None),
    }))
  }

  pub fn source(&self) -> Arc<FusedSource> { self.0.clone() }
}

impl FusedSource {
  /// Make `value` available and signal it, the way an async fused source
  /// does.
  pub fn push(&self, value: i32) {
    let _ = self.queue.offer(value);
    let subscriber = self.subscriber.lock().clone();
    if let Some(s) = subscriber {
      s.on_next(value);
    }
  }

  pub fn complete(&self) {
    let subscriber = self.subscriber.lock().clone();
    if let Some(s) = subscriber {
      s.on_complete();
    }
  }

  pub fn requests(&self) -> Vec<u64> { self.requested.lock().clone() }

  pub fn cancel_count(&self) -> usize { self.cancelled.load(Ordering::SeqCst) }

  pub fn clear_count(&self) -> usize { self.cleared_on.lock().len() }

  /// The threads `clear` ran on, in order.
  pub fn clear_threads(&self) -> Vec<ThreadId> { self.cleared_on.lock().clone() }

  pub fn remaining(&self) -> usize { self.queue.len() }
}

impl Subscription for FusedSource {
  fn request(&self, n: u64) { self.requested.lock().push(n); }

  fn cancel(&self) { self.cancelled.fetch_add(1, Ordering::SeqCst); }
}

impl QueueSubscription<i32> for FusedSource {
  fn request_fusion(&self, mode: FusionMode) -> FusionMode {
    if mode.accepts(self.mode) { self.mode } else { FusionMode::None }
  }

  fn poll(&self) -> Option<i32> { self.queue.poll() }

  fn is_empty(&self) -> bool { self.queue.is_empty() }

  fn clear(&self) {
    self.cleared_on.lock().push(thread::current().id());
    self.queue.clear();
  }
}

impl Publisher<i32, FlowError> for FusedPublisher {
  fn subscribe(&self, subscriber: Arc<dyn Subscriber<i32, FlowError>>) {
    *self.0.subscriber.lock() = Some(subscriber.clone());
    subscriber.on_subscribe(SubscriptionHandle::Fusable(self.0.clone()));
  }
}

/// Counts how many buffers a factory handed out.
pub fn counting_factory(capacity: usize) -> (Arc<AtomicUsize>, QueueFactory<i32>) {
  let created = Arc::new(AtomicUsize::new(0));
  let c_created = created.clone();
  let factory: QueueFactory<i32> = Arc::new(move || -> Result<Box<dyn Queue<i32>>, FlowError> {
    c_created.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(BoundedQueue::new(capacity)?) as Box<dyn Queue<i32>>)
  });
  (created, factory)
}
