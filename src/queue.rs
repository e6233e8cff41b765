//! Read-ahead buffers for operators that decouple producer and consumer.
//!
//! All queues are non-blocking and usable through `&self`, so a single
//! writer and a single reader may run on different threads without extra
//! locking.

use std::sync::Arc;

use crossbeam_queue::{ArrayQueue, SegQueue};

use crate::error::FlowError;

/// A non-blocking FIFO container.
pub trait Queue<T>: Send + Sync {
  /// Append `value`, handing it back when the queue is full.
  fn offer(&self, value: T) -> Result<(), T>;

  fn poll(&self) -> Option<T>;

  fn is_empty(&self) -> bool;

  fn len(&self) -> usize;

  fn clear(&self) { while self.poll().is_some() {} }
}

/// Produces a fresh queue per subscription.
pub type QueueFactory<T> = Arc<dyn Fn() -> Result<Box<dyn Queue<T>>, FlowError> + Send + Sync>;

/// Fixed-capacity queue backed by a ring buffer.
pub struct BoundedQueue<T>(ArrayQueue<T>);

impl<T> BoundedQueue<T> {
  pub fn new(capacity: usize) -> Result<Self, FlowError> {
    if capacity == 0 {
      return Err(FlowError::BufferAllocation("capacity must be positive".into()));
    }
    Ok(Self(ArrayQueue::new(capacity)))
  }

  #[inline]
  pub fn capacity(&self) -> usize { self.0.capacity() }
}

impl<T: Send> Queue<T> for BoundedQueue<T> {
  #[inline]
  fn offer(&self, value: T) -> Result<(), T> { self.0.push(value) }

  #[inline]
  fn poll(&self) -> Option<T> { self.0.pop() }

  #[inline]
  fn is_empty(&self) -> bool { self.0.is_empty() }

  #[inline]
  fn len(&self) -> usize { self.0.len() }
}

/// Queue that grows as needed, built from linked segments.
pub struct UnboundedQueue<T>(SegQueue<T>);

impl<T> Default for UnboundedQueue<T> {
  fn default() -> Self { Self(SegQueue::new()) }
}

impl<T> UnboundedQueue<T> {
  #[inline]
  pub fn new() -> Self { Self::default() }
}

impl<T: Send> Queue<T> for UnboundedQueue<T> {
  #[inline]
  fn offer(&self, value: T) -> Result<(), T> {
    self.0.push(value);
    Ok(())
  }

  #[inline]
  fn poll(&self) -> Option<T> { self.0.pop() }

  #[inline]
  fn is_empty(&self) -> bool { self.0.is_empty() }

  #[inline]
  fn len(&self) -> usize { self.0.len() }
}

pub fn bounded<T: Send + 'static>(capacity: usize) -> QueueFactory<T> {
  Arc::new(move || -> Result<Box<dyn Queue<T>>, FlowError> {
    Ok(Box::new(BoundedQueue::new(capacity)?) as Box<dyn Queue<T>>)
  })
}

pub fn unbounded<T: Send + 'static>() -> QueueFactory<T> {
  Arc::new(|| -> Result<Box<dyn Queue<T>>, FlowError> {
    Ok(Box::new(UnboundedQueue::new()) as Box<dyn Queue<T>>)
  })
}

/// The factory used when none is given: a ring buffer holding exactly one
/// prefetch batch, or a growable queue when the prefetch is unbounded.
pub fn for_prefetch<T: Send + 'static>(prefetch: usize) -> QueueFactory<T> {
  if prefetch == usize::MAX { unbounded() } else { bounded(prefetch) }
}
