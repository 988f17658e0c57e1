use std::fmt;

/// Lifecycle of a bridged channel.
///
/// Moves only forward: `Open -> Closing -> Closed`, or straight to `Closed`
/// when a close finds nothing left to drain or the consumer goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
  /// Accepting sends.
  Open,
  /// Close requested. New sends are refused; buffered items and sends that
  /// were already parked still drain to the consumer.
  Closing,
  /// Terminal. Nothing is delivered and every send is refused.
  Closed,
}

impl ChannelState {
  #[inline]
  pub fn is_open(self) -> bool {
    self == ChannelState::Open
  }
}

impl fmt::Display for ChannelState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ChannelState::Open => "open",
      ChannelState::Closing => "closing",
      ChannelState::Closed => "closed",
    })
  }
}
