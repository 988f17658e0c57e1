// src/error.rs

use std::fmt;
use thiserror::Error;

/// Error returned by the suspending [`send`](crate::Producer::send) and the
/// thread-blocking [`send_blocking`](crate::Producer::send_blocking) when the
/// channel is closing, closed, or torn down.
///
/// This is a hard failure: the value was never accepted and will never be
/// delivered. It is handed back so the caller can decide what to do with it.
/// Channels are not reusable, so retrying on the same channel is pointless.
#[derive(Error, PartialEq, Eq, Clone)]
pub enum SendError<T> {
  #[error("channel closed")]
  ChannelClosed(T),
}

impl<T> SendError<T> {
  /// Consumes the error, returning the value that could not be sent.
  #[inline]
  pub fn into_inner(self) -> T {
    match self {
      SendError::ChannelClosed(v) => v,
    }
  }
}

impl<T> fmt::Debug for SendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SendError::ChannelClosed(_) => write!(f, "SendError::ChannelClosed(..)"),
    }
  }
}

/// Error returned by [`Receive::try_recv`](crate::Receive::try_recv).
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvError {
  /// Nothing is available right now, but the channel may still deliver.
  #[error("channel empty")]
  Empty,
  /// The channel is closed and fully drained. No item will ever arrive.
  #[error("channel closed and drained")]
  Closed,
}

/// Failures surfaced by the flow builders in [`crate::flow`].
#[cfg(feature = "flow")]
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum FlowError {
  /// A `callback_flow` block returned while its channel was still open.
  /// Callback based producers must park on `Producer::closed()` until the
  /// channel is closed, otherwise late callbacks would race a dead channel.
  #[error("callback_flow block returned without awaiting close")]
  MissingAwaitClose,
  /// The producer block panicked. The flow ended after draining what had
  /// already been accepted.
  #[error("producer block panicked: {0}")]
  ProducerPanicked(String),
}
