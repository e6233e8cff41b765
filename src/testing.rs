//! Test doubles for driving and observing streams.
//!
//! [`TestSubscriber`] records every signal it receives and lets the test
//! control demand. Together with [`TestScheduler`] it makes the interleaving
//! of producer, consumer and scheduler fully deterministic.

use std::{
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
  thread::{self, ThreadId},
  time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

pub use crate::scheduler::TestScheduler;
use crate::{
  subscriber::Subscriber,
  subscription::{Subscription, SubscriptionHandle},
};

struct Recorded<Item, Err> {
  values: Vec<Item>,
  error: Option<Err>,
  completions: usize,
  subscriptions: usize,
  after_terminal: usize,
  threads: Vec<ThreadId>,
}

impl<Item, Err> Recorded<Item, Err> {
  fn is_terminated(&self) -> bool { self.error.is_some() || self.completions > 0 }
}

/// A subscriber that records what it receives.
pub struct TestSubscriber<Item, Err> {
  initial_request: u64,
  per_item: u64,
  cancel_after: Option<usize>,
  subscription: Mutex<Option<SubscriptionHandle<Item>>>,
  recorded: Mutex<Recorded<Item, Err>>,
  changed: Condvar,
  in_flight: AtomicUsize,
  overlap: AtomicBool,
}

impl<Item, Err> TestSubscriber<Item, Err> {
  fn build(initial_request: u64, per_item: u64, cancel_after: Option<usize>) -> Arc<Self> {
    Arc::new(Self {
      initial_request,
      per_item,
      cancel_after,
      subscription: Mutex::new(None),
      recorded: Mutex::new(Recorded {
        values: vec![],
        error: None,
        completions: 0,
        subscriptions: 0,
        after_terminal: 0,
        threads: vec![],
      }),
      changed: Condvar::new(),
      in_flight: AtomicUsize::new(0),
      overlap: AtomicBool::new(false),
    })
  }

  /// Requests `initial_request` as soon as it is subscribed, `0` meaning
  /// nothing until [`request`](Self::request) is called.
  pub fn new(initial_request: u64) -> Arc<Self> { Self::build(initial_request, 0, None) }

  /// Requests `initial_request` on subscribe, then `per_item` more from
  /// inside every `on_next`.
  pub fn replenishing(initial_request: u64, per_item: u64) -> Arc<Self> {
    Self::build(initial_request, per_item, None)
  }

  /// Cancels its subscription from inside the `count`-th `on_next`.
  pub fn cancel_after(initial_request: u64, count: usize) -> Arc<Self> {
    Self::build(initial_request, 0, Some(count))
  }

  fn current(&self) -> Option<SubscriptionHandle<Item>> { self.subscription.lock().clone() }

  pub fn request(&self, n: u64) {
    if let Some(subscription) = self.current() {
      subscription.request(n);
    }
  }

  pub fn cancel(&self) {
    if let Some(subscription) = self.current() {
      subscription.cancel();
    }
  }

  pub fn value_count(&self) -> usize { self.recorded.lock().values.len() }

  pub fn completion_count(&self) -> usize { self.recorded.lock().completions }

  pub fn is_completed(&self) -> bool { self.completion_count() > 0 }

  pub fn is_terminated(&self) -> bool { self.recorded.lock().is_terminated() }

  /// How many times `on_subscribe` was called.
  pub fn subscription_count(&self) -> usize { self.recorded.lock().subscriptions }

  /// Signals received after the first terminal one.
  pub fn signals_after_terminal(&self) -> usize { self.recorded.lock().after_terminal }

  /// Whether two signals were ever delivered concurrently.
  pub fn saw_overlap(&self) -> bool { self.overlap.load(Ordering::SeqCst) }

  /// The threads `on_next`, `on_error` and `on_complete` ran on, in order.
  pub fn delivery_threads(&self) -> Vec<ThreadId> { self.recorded.lock().threads.clone() }

  /// Block until a terminal signal arrived. Returns `false` on timeout.
  pub fn await_terminal(&self, timeout: Duration) -> bool {
    self.wait_until(timeout, |r| r.is_terminated())
  }

  /// Block until at least `count` values arrived. Returns `false` on
  /// timeout.
  pub fn await_count(&self, count: usize, timeout: Duration) -> bool {
    self.wait_until(timeout, |r| r.values.len() >= count)
  }

  fn wait_until(&self, timeout: Duration, done: impl Fn(&Recorded<Item, Err>) -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    let mut recorded = self.recorded.lock();
    while !done(&recorded) {
      if self.changed.wait_until(&mut recorded, deadline).timed_out() {
        return done(&recorded);
      }
    }
    true
  }

  /// Record one signal; returns the number of values seen so far.
  fn record(&self, update: impl FnOnce(&mut Recorded<Item, Err>)) -> usize {
    if self.in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
      self.overlap.store(true, Ordering::SeqCst);
    }
    let count = {
      let mut recorded = self.recorded.lock();
      if recorded.is_terminated() {
        recorded.after_terminal += 1;
      }
      recorded.threads.push(thread::current().id());
      update(&mut recorded);
      recorded.values.len()
    };
    self.changed.notify_all();
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    count
  }
}

impl<Item: Clone, Err> TestSubscriber<Item, Err> {
  pub fn values(&self) -> Vec<Item> { self.recorded.lock().values.clone() }
}

impl<Item, Err: Clone> TestSubscriber<Item, Err> {
  pub fn error(&self) -> Option<Err> { self.recorded.lock().error.clone() }
}

impl<Item, Err> Subscriber<Item, Err> for TestSubscriber<Item, Err>
where
  Item: Send,
  Err: Send,
{
  fn on_subscribe(&self, subscription: SubscriptionHandle<Item>) {
    self.recorded.lock().subscriptions += 1;
    {
      let mut current = self.subscription.lock();
      if current.is_some() {
        drop(current);
        subscription.cancel();
        return;
      }
      *current = Some(subscription.clone());
    }
    if self.initial_request > 0 {
      subscription.request(self.initial_request);
    }
  }

  fn on_next(&self, value: Item) {
    let count = self.record(|r| r.values.push(value));
    if self.per_item > 0 {
      self.request(self.per_item);
    }
    if self.cancel_after == Some(count) {
      self.cancel();
    }
  }

  fn on_error(&self, err: Err) {
    self.record(|r| {
      if r.error.is_none() {
        r.error = Some(err);
      }
    });
  }

  fn on_complete(&self) { self.record(|r| r.completions += 1); }
}
