//! Versioned cancel handles.
//!
//! Every scheduling attempt of a drain gets a fresh, strictly increasing
//! index. The slot holding the current handle only ever moves forward, so a
//! slow attempt can never overwrite a newer one, and once the slot is
//! terminated every late attempt cancels its own submission.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use once_cell::sync::Lazy;

use super::CancelHandle;

/// A cancel handle stamped with the index of the attempt that produced it.
pub(crate) struct IndexedCancellable {
  index: u64,
  handle: Option<CancelHandle>,
}

static TERMINATED: Lazy<Arc<IndexedCancellable>> =
  Lazy::new(|| Arc::new(IndexedCancellable { index: u64::MAX, handle: None }));

impl IndexedCancellable {
  pub(crate) fn new(index: u64, handle: CancelHandle) -> Self {
    Self { index, handle: Some(handle) }
  }

  #[inline]
  pub(crate) fn index(&self) -> u64 { self.index }

  #[inline]
  pub(crate) fn is_terminated(this: &Arc<Self>) -> bool { Arc::ptr_eq(this, &TERMINATED) }

  /// Whether the cancellation guaranteed the work never starts.
  pub(crate) fn cancel(&self) -> bool { self.handle.as_ref().map_or(false, |h| h.cancel()) }
}

/// Outcome of [`TaskSlot::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Install {
  /// The handle is now the current one.
  Installed,
  /// A newer attempt already owns the slot; the handle was left alone.
  Superseded,
  /// The slot was terminated and the handle cancelled. `stopped` tells
  /// whether that cancellation came before the work started.
  Terminated { stopped: bool },
}

/// Holds the handle of the most recent scheduling attempt.
#[derive(Default)]
pub(crate) struct TaskSlot(ArcSwapOption<IndexedCancellable>);

impl TaskSlot {
  pub(crate) fn install(&self, index: u64, handle: CancelHandle) -> Install {
    let next = Arc::new(IndexedCancellable::new(index, handle));
    loop {
      let current = self.0.load();
      if let Some(curr) = &*current {
        if IndexedCancellable::is_terminated(curr) {
          return Install::Terminated { stopped: next.cancel() };
        }
        if curr.index() > index {
          return Install::Superseded;
        }
      }
      let prev = self.0.compare_and_swap(&*current, Some(next.clone()));
      let swapped = match (&*prev, &*current) {
        (Some(p), Some(c)) => Arc::ptr_eq(p, c),
        (None, None) => true,
        _ => false,
      };
      if swapped {
        return Install::Installed;
      }
    }
  }

  /// Terminate the slot and cancel the handle it held. Returns `true` only
  /// when that handle's work was pending and will now never start.
  pub(crate) fn terminate(&self) -> bool {
    if self.is_terminated() {
      return false;
    }
    match self.0.swap(Some(TERMINATED.clone())) {
      Some(prev) => prev.cancel(),
      None => false,
    }
  }

  pub(crate) fn is_terminated(&self) -> bool {
    matches!(&*self.0.load(), Some(curr) if IndexedCancellable::is_terminated(curr))
  }

  #[cfg(test)]
  pub(crate) fn current_index(&self) -> Option<u64> {
    let current = self.0.load();
    (*current).as_ref().map(|c| c.index())
  }
}
