use std::sync::{
  atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  Arc, Weak,
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{
  backpressure::{get_and_add_cap, produced, validate_request},
  error::FlowError,
  queue::{Queue, QueueFactory},
  scheduler::{Install, Runnable, Scheduler, TaskSlot},
  subscriber::Subscriber,
  subscription::{
    EmptySubscription, FusionMode, QueueSubscription, Subscription, SubscriptionHandle, UNBOUNDED,
  },
};

/// How values reach the drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceMode {
  /// Pushed by upstream into a private buffer.
  Normal,
  /// Pulled from upstream, which already holds every value.
  Sync,
  /// Pulled from upstream; `on_next` only announces availability.
  Async,
}

enum Buffer<Item> {
  Owned(Box<dyn Queue<Item>>),
  Fused(Arc<dyn QueueSubscription<Item>>),
}

impl<Item> Buffer<Item> {
  #[inline]
  fn poll(&self) -> Option<Item> {
    match self {
      Buffer::Owned(q) => q.poll(),
      Buffer::Fused(q) => q.poll(),
    }
  }

  #[inline]
  fn is_empty(&self) -> bool {
    match self {
      Buffer::Owned(q) => q.is_empty(),
      Buffer::Fused(q) => q.is_empty(),
    }
  }

  fn clear(&self) {
    match self {
      Buffer::Owned(q) => q.clear(),
      Buffer::Fused(q) => q.clear(),
    }
  }
}

struct Upstream<Item> {
  subscription: SubscriptionHandle<Item>,
  buffer: Buffer<Item>,
  mode: SourceMode,
}

/// Sits between upstream and the downstream subscriber: buffers upstream
/// values and drains them on the scheduler as demand allows.
///
/// Three parties touch it concurrently: upstream (`on_*`), downstream
/// (`request`/`cancel`) and the drain. `wip` grants exclusive ownership of
/// the drain and of the buffer; every other field is either atomic or
/// written once.
///
/// Downstream holds on to this subscriber through its subscription, so the
/// reference back to downstream is dropped once the stream ends.
pub(super) struct ObserveOnSubscriber<Item, Err> {
  actual: Mutex<Option<Arc<dyn Subscriber<Item, Err>>>>,
  scheduler: Arc<dyn Scheduler>,
  delay_error: bool,
  prefetch: usize,
  queue_factory: QueueFactory<Item>,
  me: Weak<Self>,

  upstream: OnceCell<Upstream<Item>>,
  cancelled: AtomicBool,
  done: AtomicBool,
  cleaned: AtomicBool,
  error: Mutex<Option<Err>>,
  wip: AtomicUsize,
  requested: AtomicU64,
  task: TaskSlot,
  index: AtomicU64,
}

impl<Item, Err> ObserveOnSubscriber<Item, Err>
where
  Item: Send + 'static,
  Err: From<FlowError> + Send + 'static,
{
  pub(super) fn new(
    actual: Arc<dyn Subscriber<Item, Err>>, scheduler: Arc<dyn Scheduler>, delay_error: bool,
    prefetch: usize, queue_factory: QueueFactory<Item>,
  ) -> Arc<Self> {
    Arc::new_cyclic(|me| Self {
      actual: Mutex::new(Some(actual)),
      scheduler,
      delay_error,
      prefetch,
      queue_factory,
      me: me.clone(),
      upstream: OnceCell::new(),
      cancelled: AtomicBool::new(false),
      done: AtomicBool::new(false),
      cleaned: AtomicBool::new(false),
      error: Mutex::new(None),
      wip: AtomicUsize::new(0),
      requested: AtomicU64::new(0),
      task: TaskSlot::default(),
      index: AtomicU64::new(0),
    })
  }

  fn prefetch_demand(&self) -> u64 {
    if self.prefetch == usize::MAX { UNBOUNDED } else { self.prefetch as u64 }
  }

  #[inline]
  fn downstream(&self) -> Option<Arc<dyn Subscriber<Item, Err>>> { self.actual.lock().clone() }

  /// Give up the downstream reference, returning it if still held.
  #[inline]
  fn release(&self) -> Option<Arc<dyn Subscriber<Item, Err>>> { self.actual.lock().take() }

  /// Record `upstream` and hand ourselves to downstream. Returns `false` if
  /// another subscription won the race.
  fn accept(&self, upstream: Upstream<Item>) -> bool {
    let subscription = upstream.subscription.clone();
    let sync = upstream.mode == SourceMode::Sync;
    if self.upstream.set(upstream).is_err() {
      tracing::warn!("protocol violation: on_subscribe called twice, cancelling the new subscription");
      subscription.cancel();
      return false;
    }
    if sync {
      // Upstream already holds every value.
      self.done.store(true, Ordering::Release);
    }
    match (self.me.upgrade(), self.downstream()) {
      (Some(me), Some(actual)) => {
        actual.on_subscribe(SubscriptionHandle::Plain(me));
        true
      }
      _ => false,
    }
  }

  fn store_error(&self, err: Err) {
    let mut slot = self.error.lock();
    if slot.is_none() {
      *slot = Some(err);
    }
  }

  /// Cancel upstream and drop whatever is buffered, once. Only the drain
  /// owner may call it.
  fn clean_up(&self) {
    if self.cleaned.swap(true, Ordering::AcqRel) {
      return;
    }
    self.release();
    if let Some(upstream) = self.upstream.get() {
      tracing::debug!("observe_on cancelled, releasing upstream and buffer");
      upstream.subscription.cancel();
      upstream.buffer.clear();
    }
  }

  fn try_schedule(&self) {
    if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
      return;
    }
    let Some(me) = self.me.upgrade() else {
      return;
    };
    let index = self.index.fetch_add(1, Ordering::Relaxed);
    let handle = self.scheduler.submit(me);
    match self.task.install(index, handle) {
      Install::Installed => tracing::trace!(index, "observe_on drain scheduled"),
      Install::Superseded => tracing::trace!(index, "observe_on stale drain schedule discarded"),
      Install::Terminated { stopped } => {
        tracing::trace!(index, stopped, "observe_on drain submission cancelled, cancel raced ahead");
        // The drain will never run, so its cleanup falls to us.
        if stopped {
          self.clean_up();
        }
      }
    }
  }

  fn check_terminated(&self, upstream: &Upstream<Item>, done: bool, empty: bool) -> bool {
    if self.cancelled.load(Ordering::Acquire) {
      self.clean_up();
      return true;
    }
    if !done {
      return false;
    }
    if self.delay_error {
      if !empty {
        return false;
      }
      let error = self.error.lock().take();
      self.terminate(error);
      return true;
    }
    let error = self.error.lock().take();
    if error.is_some() {
      upstream.buffer.clear();
      self.terminate(error);
      true
    } else if empty {
      self.terminate(None);
      true
    } else {
      false
    }
  }

  fn terminate(&self, error: Option<Err>) {
    let Some(actual) = self.release() else {
      return;
    };
    match error {
      Some(err) => actual.on_error(err),
      None => actual.on_complete(),
    }
  }

  fn drain(&self) {
    let (Some(upstream), Some(actual)) = (self.upstream.get(), self.downstream()) else {
      return;
    };
    let mut missed = 1;
    loop {
      let requested = self.requested.load(Ordering::Acquire);
      let mut emitted = 0;

      while emitted != requested {
        let done = self.done.load(Ordering::Acquire);
        let value = upstream.buffer.poll();
        if self.check_terminated(upstream, done, value.is_none()) {
          return;
        }
        let Some(value) = value else {
          break;
        };
        actual.on_next(value);
        emitted += 1;
      }

      if emitted == requested {
        let done = self.done.load(Ordering::Acquire);
        if self.check_terminated(upstream, done, upstream.buffer.is_empty()) {
          return;
        }
      }

      if emitted != 0 {
        if upstream.mode != SourceMode::Sync {
          upstream.subscription.request(emitted);
        }
        if requested != UNBOUNDED {
          produced(&self.requested, emitted);
        }
      }

      missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
      if missed == 0 {
        break;
      }
    }
  }
}

impl<Item, Err> Subscriber<Item, Err> for ObserveOnSubscriber<Item, Err>
where
  Item: Send + 'static,
  Err: From<FlowError> + Send + 'static,
{
  fn on_subscribe(&self, subscription: SubscriptionHandle<Item>) {
    if self.upstream.get().is_some() {
      tracing::warn!("protocol violation: on_subscribe called twice, cancelling the new subscription");
      subscription.cancel();
      return;
    }

    if let SubscriptionHandle::Fusable(queue) = &subscription {
      match queue.request_fusion(FusionMode::Any) {
        FusionMode::Sync => {
          tracing::debug!("observe_on fused with upstream in sync mode");
          let queue = queue.clone();
          self.accept(Upstream { subscription, buffer: Buffer::Fused(queue), mode: SourceMode::Sync });
          return;
        }
        FusionMode::Async => {
          tracing::debug!("observe_on fused with upstream in async mode");
          let queue = queue.clone();
          let upstream = subscription.clone();
          if self.accept(Upstream { subscription, buffer: Buffer::Fused(queue), mode: SourceMode::Async }) {
            upstream.request(self.prefetch_demand());
          }
          return;
        }
        _ => tracing::debug!("observe_on fusion refused by upstream"),
      }
    }

    match (self.queue_factory)() {
      Ok(queue) => {
        let upstream = subscription.clone();
        let accepted = self.accept(Upstream {
          subscription,
          buffer: Buffer::Owned(queue),
          mode: SourceMode::Normal,
        });
        if accepted {
          upstream.request(self.prefetch_demand());
        }
      }
      Err(err) => {
        tracing::debug!(%err, "observe_on could not allocate its buffer");
        subscription.cancel();
        if let Some(actual) = self.release() {
          EmptySubscription::error(&*actual, err.into());
        }
      }
    }
  }

  fn on_next(&self, value: Item) {
    let Some(upstream) = self.upstream.get() else {
      tracing::warn!("protocol violation: on_next before on_subscribe");
      return;
    };
    if upstream.mode == SourceMode::Async {
      self.try_schedule();
      return;
    }
    if self.done.load(Ordering::Acquire) {
      return;
    }
    if let Buffer::Owned(queue) = &upstream.buffer {
      if queue.offer(value).is_err() {
        tracing::warn!("observe_on buffer overflow, upstream emitted more than requested");
        self.store_error(FlowError::BufferOverflow.into());
        self.done.store(true, Ordering::Release);
      }
    }
    self.try_schedule();
  }

  fn on_error(&self, err: Err) {
    if self.done.load(Ordering::Acquire) {
      tracing::debug!("observe_on dropped an error received after termination");
      return;
    }
    self.store_error(err);
    self.done.store(true, Ordering::Release);
    self.try_schedule();
  }

  fn on_complete(&self) {
    if self.done.swap(true, Ordering::AcqRel) {
      return;
    }
    self.try_schedule();
  }
}

impl<Item, Err> Subscription for ObserveOnSubscriber<Item, Err>
where
  Item: Send + 'static,
  Err: From<FlowError> + Send + 'static,
{
  fn request(&self, n: u64) {
    if validate_request(n) {
      get_and_add_cap(&self.requested, n);
      self.try_schedule();
    }
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    let stopped = self.task.terminate();
    // `wip` is never released again, so no later signal schedules a drain.
    // A running or pending drain observes `cancelled` and cleans up itself;
    // the buffer is ours only when no drain holds it or the pending one was
    // stopped before it started.
    if self.wip.fetch_add(1, Ordering::AcqRel) == 0 || stopped {
      self.clean_up();
    }
  }
}

impl<Item, Err> Runnable for ObserveOnSubscriber<Item, Err>
where
  Item: Send + 'static,
  Err: From<FlowError> + Send + 'static,
{
  fn run(&self) { self.drain(); }
}

#[cfg(test)]
mod test {
  use std::{
    sync::{atomic::AtomicUsize, Barrier},
    thread,
  };

  use super::*;
  use crate::{
    queue::{bounded, unbounded, UnboundedQueue},
    scheduler::{ImmediateScheduler, TestScheduler},
    testing::TestSubscriber,
  };

  /// Upstream double recording the demand it receives.
  #[derive(Default)]
  struct Recording {
    requested: Mutex<Vec<u64>>,
    cancelled: AtomicUsize,
  }

  impl Subscription for Recording {
    fn request(&self, n: u64) { self.requested.lock().push(n); }

    fn cancel(&self) { self.cancelled.fetch_add(1, Ordering::SeqCst); }
  }

  /// Upstream double that grants a fixed fusion mode over a shared queue.
  struct Fused {
    mode: FusionMode,
    queue: UnboundedQueue<i32>,
    requested: Mutex<Vec<u64>>,
    cleared: AtomicUsize,
  }

  impl Fused {
    fn new(mode: FusionMode, values: &[i32]) -> Arc<Self> {
      let queue = UnboundedQueue::new();
      for v in values {
        let _ = queue.offer(*v);
      }
      Arc::new(Self { mode, queue, requested: Mutex::new(vec![]), cleared: AtomicUsize::new(0) })
    }
  }

  impl Subscription for Fused {
    fn request(&self, n: u64) { self.requested.lock().push(n); }

    fn cancel(&self) {}
  }

  impl QueueSubscription<i32> for Fused {
    fn request_fusion(&self, mode: FusionMode) -> FusionMode {
      if mode.accepts(self.mode) { self.mode } else { FusionMode::None }
    }

    fn poll(&self) -> Option<i32> { self.queue.poll() }

    fn is_empty(&self) -> bool { self.queue.is_empty() }

    fn clear(&self) {
      self.cleared.fetch_add(1, Ordering::SeqCst);
      self.queue.clear();
    }
  }

  type Parent = ObserveOnSubscriber<i32, FlowError>;

  fn parent(
    subscriber: &Arc<TestSubscriber<i32, FlowError>>, scheduler: impl Scheduler + 'static,
    delay_error: bool, prefetch: usize,
  ) -> Arc<Parent> {
    ObserveOnSubscriber::new(
      subscriber.clone(),
      Arc::new(scheduler),
      delay_error,
      prefetch,
      bounded(prefetch),
    )
  }

  #[test]
  fn requests_prefetch_then_replenishes() {
    let scheduler = TestScheduler::new();
    let subscriber = TestSubscriber::new(0);
    let parent = parent(&subscriber, scheduler.clone(), false, 4);
    let upstream = Arc::new(Recording::default());
    parent.on_subscribe(SubscriptionHandle::Plain(upstream.clone()));
    assert_eq!(*upstream.requested.lock(), vec![4]);

    for i in 0..4 {
      parent.on_next(i);
    }
    assert_eq!(scheduler.pending_count(), 1);
    scheduler.flush();
    assert!(subscriber.values().is_empty());

    subscriber.request(3);
    scheduler.flush();
    assert_eq!(subscriber.values(), vec![0, 1, 2]);
    assert_eq!(*upstream.requested.lock(), vec![4, 3]);
  }

  #[test]
  fn overflow_terminates_with_error() {
    let subscriber = TestSubscriber::new(0);
    let parent = parent(&subscriber, ImmediateScheduler, true, 2);
    parent.on_subscribe(SubscriptionHandle::plain(EmptySubscription));
    parent.on_next(1);
    parent.on_next(2);
    parent.on_next(3);
    assert!(!subscriber.is_terminated());

    subscriber.request(10);
    assert_eq!(subscriber.values(), vec![1, 2]);
    assert_eq!(subscriber.error(), Some(FlowError::BufferOverflow));
  }

  #[test]
  fn allocation_failure_is_delivered() {
    let subscriber = TestSubscriber::<i32, FlowError>::new(1);
    let failing: QueueFactory<i32> = Arc::new(|| -> Result<Box<dyn Queue<i32>>, FlowError> {
      Err(FlowError::BufferAllocation("no memory".into()))
    });
    let parent = ObserveOnSubscriber::new(
      subscriber.clone(),
      Arc::new(ImmediateScheduler),
      false,
      8,
      failing,
    );
    let upstream = Arc::new(Recording::default());
    parent.on_subscribe(SubscriptionHandle::Plain(upstream.clone()));

    assert_eq!(upstream.cancelled.load(Ordering::SeqCst), 1);
    assert!(upstream.requested.lock().is_empty());
    assert_eq!(
      subscriber.error(),
      Some(FlowError::BufferAllocation("no memory".into()))
    );
  }

  #[test]
  fn second_subscription_is_cancelled() {
    let subscriber = TestSubscriber::new(0);
    let parent = parent(&subscriber, ImmediateScheduler, false, 2);
    let first = Arc::new(Recording::default());
    let second = Arc::new(Recording::default());
    parent.on_subscribe(SubscriptionHandle::Plain(first.clone()));
    parent.on_subscribe(SubscriptionHandle::Plain(second.clone()));

    assert_eq!(first.cancelled.load(Ordering::SeqCst), 0);
    assert_eq!(second.cancelled.load(Ordering::SeqCst), 1);
    assert!(second.requested.lock().is_empty());
    assert_eq!(subscriber.subscription_count(), 1);
  }

  #[test]
  fn sync_fusion_never_requests_upstream() {
    let subscriber = TestSubscriber::new(2);
    let parent = parent(&subscriber, ImmediateScheduler, false, 8);
    let upstream = Fused::new(FusionMode::Sync, &[1, 2, 3]);
    parent.on_subscribe(SubscriptionHandle::Fusable(upstream.clone()));
    assert_eq!(subscriber.values(), vec![1, 2]);
    assert!(!subscriber.is_terminated());

    subscriber.request(1);
    assert_eq!(subscriber.values(), vec![1, 2, 3]);
    assert!(subscriber.is_completed());
    assert!(upstream.requested.lock().is_empty());
  }

  #[test]
  fn async_fusion_uses_signals_only() {
    let scheduler = TestScheduler::new();
    let subscriber = TestSubscriber::new(UNBOUNDED);
    let parent = parent(&subscriber, scheduler.clone(), false, 8);
    let upstream = Fused::new(FusionMode::Async, &[]);
    parent.on_subscribe(SubscriptionHandle::Fusable(upstream.clone()));
    assert_eq!(*upstream.requested.lock(), vec![8]);

    let _ = upstream.queue.offer(10);
    parent.on_next(-1);
    let _ = upstream.queue.offer(11);
    parent.on_next(-1);
    scheduler.flush();
    assert_eq!(subscriber.values(), vec![10, 11]);
    assert_eq!(*upstream.requested.lock(), vec![8, 2]);
  }

  #[test]
  fn cancel_is_idempotent() {
    let scheduler = TestScheduler::new();
    let subscriber = TestSubscriber::new(0);
    let parent = parent(&subscriber, scheduler.clone(), false, 8);
    let upstream = Fused::new(FusionMode::Async, &[1, 2]);
    parent.on_subscribe(SubscriptionHandle::Fusable(upstream.clone()));

    parent.cancel();
    parent.cancel();
    scheduler.flush();
    assert_eq!(upstream.cleared.load(Ordering::SeqCst), 1);
    assert!(upstream.queue.is_empty());
  }

  #[test]
  fn downstream_is_released_after_completion() {
    let subscriber = TestSubscriber::new(UNBOUNDED);
    let parent = parent(&subscriber, ImmediateScheduler, false, 4);
    parent.on_subscribe(SubscriptionHandle::Plain(Arc::new(Recording::default())));
    parent.on_next(1);
    parent.on_complete();
    assert!(subscriber.is_completed());

    let downstream = Arc::downgrade(&subscriber);
    let weak_parent = Arc::downgrade(&parent);
    drop(subscriber);
    drop(parent);
    assert!(downstream.upgrade().is_none());
    assert!(weak_parent.upgrade().is_none());
  }

  #[test]
  fn downstream_is_released_after_cancel() {
    let scheduler = TestScheduler::new();
    let subscriber = TestSubscriber::new(0);
    let parent = parent(&subscriber, scheduler.clone(), false, 4);
    let upstream = Arc::new(Recording::default());
    parent.on_subscribe(SubscriptionHandle::Plain(upstream.clone()));
    parent.on_next(1);
    subscriber.request(1);
    assert_eq!(scheduler.pending_count(), 1);

    subscriber.cancel();
    assert_eq!(scheduler.flush(), 0);
    assert_eq!(upstream.cancelled.load(Ordering::SeqCst), 1);

    let downstream = Arc::downgrade(&subscriber);
    let weak_parent = Arc::downgrade(&parent);
    drop(subscriber);
    drop(parent);
    assert!(downstream.upgrade().is_none());
    assert!(weak_parent.upgrade().is_none());
  }

  #[test]
  fn losing_sync_subscription_leaves_the_stream_open() {
    for _ in 0..50 {
      let subscriber = TestSubscriber::new(0);
      let parent = parent(&subscriber, ImmediateScheduler, false, 4);
      let plain = Arc::new(Recording::default());
      let fused = Fused::new(FusionMode::Sync, &[9]);
      let barrier = Arc::new(Barrier::new(2));

      let racer = {
        let (parent, fused, barrier) = (parent.clone(), fused.clone(), barrier.clone());
        thread::spawn(move || {
          barrier.wait();
          parent.on_subscribe(SubscriptionHandle::Fusable(fused));
        })
      };
      barrier.wait();
      parent.on_subscribe(SubscriptionHandle::Plain(plain.clone()));
      racer.join().unwrap();
      assert_eq!(subscriber.subscription_count(), 1);

      if plain.cancelled.load(Ordering::SeqCst) == 1 {
        // The fused subscription won and is drained on request.
        subscriber.request(1);
        assert_eq!(subscriber.values(), vec![9]);
        assert!(subscriber.is_completed());
      } else {
        parent.on_next(1);
        subscriber.request(1);
        assert_eq!(subscriber.values(), vec![1]);
        assert!(!subscriber.is_terminated());
      }
    }
  }

  #[test]
  fn unbounded_prefetch_requests_without_limit() {
    let subscriber = TestSubscriber::<i32, FlowError>::new(0);
    let parent = ObserveOnSubscriber::new(
      subscriber.clone(),
      Arc::new(ImmediateScheduler),
      false,
      usize::MAX,
      unbounded(),
    );
    let upstream = Arc::new(Recording::default());
    parent.on_subscribe(SubscriptionHandle::Plain(upstream.clone()));
    assert_eq!(*upstream.requested.lock(), vec![UNBOUNDED]);
  }
}
