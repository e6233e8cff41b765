//! Demand bookkeeping shared by producers and operators.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::subscription::UNBOUNDED;

/// Check a demand amount, reporting zero as a protocol violation.
#[inline]
pub fn validate_request(n: u64) -> bool {
  if n == 0 {
    tracing::warn!("protocol violation: request(0), demand must be positive");
    false
  } else {
    true
  }
}

/// Add two demand amounts, capping at [`UNBOUNDED`].
#[inline]
pub fn add_cap(a: u64, b: u64) -> u64 { a.saturating_add(b) }

/// Atomically add `n` to `requested` with saturation and return the previous
/// value. Once `requested` reached [`UNBOUNDED`] it stays there.
pub fn get_and_add_cap(requested: &AtomicU64, n: u64) -> u64 {
  requested
    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
      if r == UNBOUNDED { None } else { Some(add_cap(r, n)) }
    })
    .unwrap_or_else(|r| r)
}

/// Same as [`get_and_add_cap`] but returns the updated value.
#[inline]
pub fn add_and_get(requested: &AtomicU64, n: u64) -> u64 {
  add_cap(get_and_add_cap(requested, n), n)
}

/// Subtract `n` emitted values from `requested`, unless it is unbounded.
/// Returns the remaining demand.
pub fn produced(requested: &AtomicU64, n: u64) -> u64 {
  requested
    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
      if r == UNBOUNDED { None } else { Some(r.saturating_sub(n)) }
    })
    .map(|r| r.saturating_sub(n))
    .unwrap_or(UNBOUNDED)
}
