//! Closeable channels that bridge callback-style producers into a pull-based
//! consumer.
//!
//! A [`BridgedChannel`] hands out cloneable [`Producer`] handles that event
//! callbacks, timer threads or other tasks use to push values in, and turns
//! into a single [`Receive`] sequence that the consumer pulls from. Capacity
//! decides what happens when the consumer is slow:
//!
//! * [`Capacity::Rendezvous`]: a value is accepted only while the consumer is
//!   waiting for it.
//! * [`Capacity::Bounded`]: up to `n` values are buffered; then blocking sends
//!   wait and try-sends drop.
//! * [`Capacity::Unbounded`]: every send is accepted while the channel is open.
//!
//! Three send flavors cover the usual callback situations: [`Producer::send`]
//! suspends an async task, [`Producer::try_send`] never waits and drops on
//! backpressure, and [`Producer::try_send_blocking`] parks the calling OS
//! thread until the value is accepted.
//!
//! Closing is graceful. [`Producer::close`] moves the channel from `Open` to
//! `Closing`; new sends are refused while buffered values still drain; the
//! channel becomes `Closed` once drained and the close hook runs exactly once.
//! Dropping the consumer instead tears the channel down on the spot.
//!
//! ```
//! use futures_util::StreamExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let channel = fibre_bridge::open::<u32>(4);
//! let producer = channel.producer();
//! let mut values = channel.receive();
//!
//! assert!(producer.try_send(1));
//! producer.send(2).await.unwrap();
//! producer.close();
//! assert!(producer.send(3).await.is_err());
//!
//! assert_eq!(values.next().await, Some(1));
//! assert_eq!(values.next().await, Some(2));
//! assert_eq!(values.next().await, None);
//! # }
//! ```

pub mod error;

mod capacity;
mod core;
mod internal;
mod producer;
mod receive;
mod slot;
mod state;

#[cfg(feature = "flow")]
pub mod flow;

pub use capacity::{Capacity, ChannelBuilder, DEFAULT_BUFFER};
pub use error::{SendError, TryRecvError};
#[cfg(feature = "flow")]
pub use error::FlowError;
pub use producer::{ClosedFuture, Producer, SendFuture};
pub use receive::{BlockingIter, BridgedChannel, Receive, RecvFuture};
pub use slot::ProducerSlot;
pub use state::ChannelState;

/// Opens a new channel in the `Open` state.
///
/// `capacity` accepts a [`Capacity`] or a plain `usize` (`0` for rendezvous).
pub fn open<T: Send>(capacity: impl Into<Capacity>) -> BridgedChannel<T> {
  BridgedChannel::new(capacity.into(), None)
}
