//! Errors raised by the flow machinery itself.
//!
//! Stream failures travel through the stream's own error type. The operator
//! only needs to be able to turn a [`FlowError`] into that type, which is why
//! it requires `Err: From<FlowError>`.

use thiserror::Error;

/// Failures produced by this crate rather than by a producer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
  /// The operator was configured with a prefetch of zero.
  #[error("prefetch > 0 required but it was {0}")]
  InvalidPrefetch(usize),

  /// The read-ahead buffer refused a value. Only happens when the upstream
  /// emits more than it was asked for.
  #[error("buffer is full: upstream emitted more than requested")]
  BufferOverflow,

  /// The buffer factory could not produce a buffer.
  #[error("failed to allocate buffer: {0}")]
  BufferAllocation(String),

  /// A failure reported by one of the crate's sources.
  #[error("upstream failed: {0}")]
  Upstream(String),
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn messages() {
    assert_eq!(
      FlowError::InvalidPrefetch(0).to_string(),
      "prefetch > 0 required but it was 0"
    );
    assert_eq!(
      FlowError::Upstream("boom".into()).to_string(),
      "upstream failed: boom"
    );
  }
}
