//! Scheduling of single-value sources without a buffer.
//!
//! The supplier runs on the scheduler. Completion and failure are delivered
//! right away; a value waits for the first request, and is emitted from a
//! second submission when that request arrives after the value.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
  backpressure::validate_request,
  publisher::ScalarSupplier,
  scheduler::{CancelHandle, Scheduler},
  subscriber::Subscriber,
  subscription::{Subscription, SubscriptionHandle},
};

enum Stage<Item> {
  /// The supplier has not produced anything yet.
  Pending,
  /// A value is waiting for demand.
  Ready(Item),
  Finished,
  Cancelled,
}

struct State<Item> {
  stage: Stage<Item>,
  requested: bool,
  handles: SmallVec<[CancelHandle; 2]>,
}

pub(super) struct ScheduledScalar<Item, Err> {
  /// Dropped on the terminal signal or on cancel.
  actual: Mutex<Option<Arc<dyn Subscriber<Item, Err>>>>,
  scheduler: Arc<dyn Scheduler>,
  me: Weak<Self>,
  state: Mutex<State<Item>>,
}

impl<Item, Err> ScheduledScalar<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  pub(super) fn subscribe(
    actual: Arc<dyn Subscriber<Item, Err>>, supplier: ScalarSupplier<Item, Err>,
    scheduler: Arc<dyn Scheduler>,
  ) {
    let scalar = Arc::new_cyclic(|me| Self {
      actual: Mutex::new(Some(actual.clone())),
      scheduler,
      me: me.clone(),
      state: Mutex::new(State {
        stage: Stage::Pending,
        requested: false,
        handles: SmallVec::new(),
      }),
    });
    actual.on_subscribe(SubscriptionHandle::Plain(scalar.clone()));
    drop(actual);

    let me = scalar.clone();
    let handle = scalar
      .scheduler
      .submit(Arc::new(move || me.compute(&supplier)));
    scalar.track(handle);
  }

  fn track(&self, handle: CancelHandle) {
    let mut state = self.state.lock();
    if matches!(state.stage, Stage::Cancelled) {
      drop(state);
      handle.cancel();
    } else {
      state.handles.push(handle);
    }
  }

  /// Move to `Finished` unless cancelled, handing back downstream.
  fn finish(&self) -> Option<Arc<dyn Subscriber<Item, Err>>> {
    {
      let mut state = self.state.lock();
      if matches!(state.stage, Stage::Cancelled | Stage::Finished) {
        return None;
      }
      state.stage = Stage::Finished;
    }
    self.actual.lock().take()
  }

  fn compute(&self, supplier: &ScalarSupplier<Item, Err>) {
    if matches!(self.state.lock().stage, Stage::Cancelled) {
      return;
    }
    match supplier() {
      Ok(Some(value)) => {
        let mut state = self.state.lock();
        if !matches!(state.stage, Stage::Pending) {
          return;
        }
        if state.requested {
          state.stage = Stage::Finished;
          drop(state);
          self.emit(value);
        } else {
          state.stage = Stage::Ready(value);
        }
      }
      Ok(None) => {
        if let Some(actual) = self.finish() {
          actual.on_complete();
        }
      }
      Err(err) => {
        if let Some(actual) = self.finish() {
          actual.on_error(err);
        }
      }
    }
  }

  fn emit(&self, value: Item) {
    let Some(actual) = self.actual.lock().clone() else {
      return;
    };
    actual.on_next(value);
    if !matches!(self.state.lock().stage, Stage::Cancelled) && self.actual.lock().take().is_some() {
      actual.on_complete();
    }
  }
}

impl<Item, Err> Subscription for ScheduledScalar<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn request(&self, n: u64) {
    if !validate_request(n) {
      return;
    }
    let value = {
      let mut state = self.state.lock();
      if state.requested {
        return;
      }
      state.requested = true;
      match std::mem::replace(&mut state.stage, Stage::Finished) {
        Stage::Ready(value) => value,
        other => {
          state.stage = other;
          return;
        }
      }
    };
    let Some(me) = self.me.upgrade() else {
      return;
    };
    tracing::trace!("scalar value requested after it was computed, scheduling its emission");
    let value = Mutex::new(Some(value));
    let handle = self.scheduler.submit(Arc::new(move || {
      if let Some(value) = value.lock().take() {
        me.emit(value);
      }
    }));
    self.track(handle);
  }

  fn cancel(&self) {
    let handles = {
      let mut state = self.state.lock();
      if matches!(state.stage, Stage::Cancelled) {
        return;
      }
      state.stage = Stage::Cancelled;
      std::mem::take(&mut state.handles)
    };
    self.actual.lock().take();
    tracing::debug!(submissions = handles.len(), "scalar observe_on cancelled");
    for handle in handles {
      handle.cancel();
    }
  }
}
