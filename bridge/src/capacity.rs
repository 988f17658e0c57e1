//! Channel sizing and construction options.

use crate::receive::BridgedChannel;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Buffer size used by [`Capacity::default`] and the flow builders when no
/// capacity is given.
pub const DEFAULT_BUFFER: usize = 64;

/// How many accepted-but-undelivered items a channel may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Capacity {
  /// No buffer. A send is only accepted while the consumer is parked
  /// waiting for it.
  Rendezvous,
  /// A buffer of `n > 0` items. Blocking sends wait for room once it is full.
  Bounded(usize),
  /// Never full. Sends are always accepted while the channel is open.
  Unbounded,
}

impl Capacity {
  /// Returns the buffer limit, or `None` for an unbounded channel.
  #[inline]
  pub fn limit(&self) -> Option<usize> {
    match *self {
      Capacity::Rendezvous => Some(0),
      Capacity::Bounded(n) => Some(n),
      Capacity::Unbounded => None,
    }
  }

  #[inline]
  pub fn is_rendezvous(&self) -> bool {
    matches!(self, Capacity::Rendezvous)
  }

  // `Bounded(0)` can be built by hand; it behaves as a rendezvous channel.
  pub(crate) fn normalized(self) -> Self {
    match self {
      Capacity::Bounded(0) => Capacity::Rendezvous,
      other => other,
    }
  }
}

impl Default for Capacity {
  fn default() -> Self {
    Capacity::Bounded(DEFAULT_BUFFER)
  }
}

impl From<usize> for Capacity {
  /// `0` is a rendezvous channel, `usize::MAX` is unbounded, anything else
  /// is a bounded buffer of that size.
  fn from(n: usize) -> Self {
    match n {
      0 => Capacity::Rendezvous,
      usize::MAX => Capacity::Unbounded,
      n => Capacity::Bounded(n),
    }
  }
}

impl From<Option<usize>> for Capacity {
  fn from(limit: Option<usize>) -> Self {
    limit.map_or(Capacity::Unbounded, Capacity::from)
  }
}

/// Builder for a [`BridgedChannel`] with a name attached.
///
/// The name shows up as a field on every `tracing` event the channel emits,
/// which makes it possible to tell several bridges apart in one log stream.
///
/// ```
/// use fibre_bridge::{Capacity, ChannelBuilder};
///
/// let channel = ChannelBuilder::new()
///   .capacity(Capacity::Rendezvous)
///   .name("clicks")
///   .open::<u32>();
/// assert_eq!(channel.capacity(), Capacity::Rendezvous);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelBuilder {
  capacity: Capacity,
  name: Option<String>,
}

impl ChannelBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn capacity(mut self, capacity: impl Into<Capacity>) -> Self {
    self.capacity = capacity.into();
    self
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn open<T: Send>(self) -> BridgedChannel<T> {
    BridgedChannel::new(self.capacity, self.name)
  }
}
