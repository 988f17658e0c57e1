// src/producer.rs

//! The sending side of a bridged channel.
//!
//! A [`Producer`] never owns the channel. It holds a `Weak` reference and
//! re-checks the lifecycle state on every call, so a handle that outlives its
//! channel stays safe to call: try-sends and closes quietly do nothing, and
//! the suspending/blocking sends fail with [`SendError::ChannelClosed`].

use crate::capacity::Capacity;
use crate::core::{Admit, BridgeShared, Parked};
use crate::error::SendError;
use crate::internal::backoff;
use crate::internal::waiter::{Outcome, Parker, SendSlot};
use crate::state::ChannelState;

use futures_util::task::AtomicWaker;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tracing::{trace, warn};

/// A cloneable handle for feeding values into a bridged channel from outside
/// the consuming context: callbacks, timer threads, other tasks.
pub struct Producer<T> {
  shared: Weak<BridgeShared<T>>,
  capacity: Capacity,
}

impl<T> Clone for Producer<T> {
  fn clone(&self) -> Self {
    Producer {
      shared: Weak::clone(&self.shared),
      capacity: self.capacity,
    }
  }
}

impl<T: Send> Producer<T> {
  pub(crate) fn new(shared: &Arc<BridgeShared<T>>) -> Self {
    Producer {
      shared: Arc::downgrade(shared),
      capacity: shared.capacity,
    }
  }

  /// Sends a value, suspending until the channel accepts it.
  ///
  /// On a rendezvous channel the value is accepted once the consumer is ready
  /// to take it; on a bounded channel once there is room in the buffer.
  ///
  /// # Errors
  ///
  /// Resolves to `Err(SendError::ChannelClosed(value))` if the channel is
  /// already closing or closed when the send starts, or if the consumer is
  /// dropped while the send is parked. A send that was parked before a
  /// regular `close` is still delivered as the channel drains.
  ///
  /// Dropping the returned future while it is parked withdraws the value.
  pub fn send(&self, value: T) -> SendFuture<T> {
    SendFuture {
      channel: Weak::clone(&self.shared),
      item: Some(value),
      parked: None,
    }
  }

  /// Attempts to send without ever suspending or blocking.
  ///
  /// Returns `false` and drops the value if the buffer is full, if the
  /// channel is a rendezvous channel whose consumer is not waiting right
  /// now, or if the channel is closing or closed.
  pub fn try_send(&self, value: T) -> bool {
    let Some(shared) = self.shared.upgrade() else {
      return false;
    };
    match shared.offer(value) {
      Admit::Accepted => true,
      Admit::Full(_) => {
        trace!(channel = shared.label(), "try_send dropped value: no room");
        false
      }
      Admit::Closed(_) => {
        trace!(channel = shared.label(), "try_send dropped value: channel not open");
        false
      }
    }
  }

  /// Sends a value, blocking the current OS thread until it is accepted.
  ///
  /// Unlike [`send`](Self::send) this cannot be cancelled by dropping a
  /// future, which makes it the tool for callback threads that must not lose
  /// values to a slow consumer. Never call it from an async task that the
  /// consumer needs in order to make progress.
  ///
  /// # Errors
  ///
  /// Same conditions as [`send`](Self::send).
  pub fn send_blocking(&self, value: T) -> Result<(), SendError<T>> {
    let result = self.block_until_settled(value);
    if result.is_err() {
      match self.shared.upgrade() {
        Some(shared) => warn!(
          channel = shared.label(),
          state = %shared.state(),
          "blocking send on a channel that is no longer open"
        ),
        None => warn!("blocking send on a dropped channel"),
      }
    }
    result
  }

  /// Thread-blocking send that reports closure through its return value
  /// instead of an error: `true` once the value is accepted, `false` if the
  /// channel was not open or was torn down while this thread waited.
  pub fn try_send_blocking(&self, value: T) -> bool {
    self.block_until_settled(value).is_ok()
  }

  fn block_until_settled(&self, value: T) -> Result<(), SendError<T>> {
    let Some(shared) = self.shared.upgrade() else {
      return Err(SendError::ChannelClosed(value));
    };
    match shared.offer_or_park(value, Parker::current_thread) {
      Parked::Accepted => Ok(()),
      Parked::Closed(value) => Err(SendError::ChannelClosed(value)),
      Parked::Waiting(slot) => {
        backoff::wait_until(|| slot.outcome().is_some());
        settled(&slot)
      }
    }
  }

  /// Requests a close. Buffered values and sends that are already parked
  /// still reach the consumer; new sends are refused.
  ///
  /// Returns `true` if this call initiated the close, `false` if the channel
  /// was already closing, closed or gone.
  pub fn close(&self) -> bool {
    self.shared.upgrade().is_some_and(|shared| shared.close(None))
  }

  /// Like [`close`](Self::close), and runs `on_closed` exactly once after the
  /// channel is fully drained and `Closed`. If this call does not initiate
  /// the close, `on_closed` is dropped without running.
  ///
  /// `on_closed` is the place to disable anything still holding this
  /// producer, such as a [`ProducerSlot`](crate::ProducerSlot).
  pub fn close_with<F>(&self, on_closed: F) -> bool
  where
    F: FnOnce() + Send + 'static,
  {
    self
      .shared
      .upgrade()
      .is_some_and(|shared| shared.close(Some(Box::new(on_closed))))
  }

  /// Registers `hook` to run once when the channel reaches `Closed`, however
  /// it gets there (close, drain, or consumer teardown). Runs `hook`
  /// immediately if the channel is already closed or gone.
  pub fn invoke_on_close<F>(&self, hook: F)
  where
    F: FnOnce() + Send + 'static,
  {
    match self.shared.upgrade() {
      Some(shared) => shared.invoke_on_close(Box::new(hook)),
      None => hook(),
    }
  }

  /// Returns a future that resolves once the channel is `Closed`.
  ///
  /// A callback-driven producer parks on this to stay alive for as long as
  /// the consumer wants values, then unregisters its callbacks.
  pub fn closed(&self) -> ClosedFuture<T> {
    ClosedFuture {
      channel: Weak::clone(&self.shared),
      watcher: Arc::new(AtomicWaker::new()),
      enqueued: false,
    }
  }

  /// Current lifecycle state. A channel whose consumer is gone reads as `Closed`.
  pub fn state(&self) -> ChannelState {
    self
      .shared
      .upgrade()
      .map_or(ChannelState::Closed, |shared| shared.state())
  }

  /// Returns `true` once the channel stopped accepting sends (`Closing` or `Closed`).
  pub fn is_closed(&self) -> bool {
    !self.state().is_open()
  }

  #[inline]
  pub fn capacity(&self) -> Capacity {
    self.capacity
  }

  /// Number of accepted values waiting for the consumer.
  pub fn len(&self) -> usize {
    self.shared.upgrade().map_or(0, |shared| shared.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T> fmt::Debug for Producer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self
      .shared
      .upgrade()
      .map_or(ChannelState::Closed, |shared| shared.state());
    f.debug_struct("Producer")
      .field("capacity", &self.capacity)
      .field("state", &state)
      .finish()
  }
}

fn settled<T>(slot: &SendSlot<T>) -> Result<(), SendError<T>> {
  match slot.outcome() {
    Some(Outcome::Accepted) => Ok(()),
    _ => {
      let value = slot
        .take_item()
        .expect("a rejected send slot keeps its value");
      Err(SendError::ChannelClosed(value))
    }
  }
}

// --- Futures ---

/// Future returned by [`Producer::send`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct SendFuture<T> {
  channel: Weak<BridgeShared<T>>,
  item: Option<T>,
  // Set while parked. Holding the strong reference keeps the slot's channel
  // alive long enough to withdraw from it on drop.
  parked: Option<(Arc<BridgeShared<T>>, Arc<SendSlot<T>>)>,
}

// The value is moved around by ownership only, never pinned.
impl<T> Unpin for SendFuture<T> {}

impl<T: Send> Future for SendFuture<T> {
  type Output = Result<(), SendError<T>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();

    if let Some((shared, slot)) = this.parked.take() {
      // Register before checking, so a settle racing this poll still wakes us.
      slot.register(cx.waker());
      return match slot.outcome() {
        None => {
          this.parked = Some((shared, slot));
          Poll::Pending
        }
        Some(_) => {
          let result = settled(&slot);
          if result.is_err() {
            warn!(channel = shared.label(), "parked send failed: consumer went away");
          }
          Poll::Ready(result)
        }
      };
    }

    let value = this.item.take().expect("SendFuture polled after completion");
    let Some(shared) = this.channel.upgrade() else {
      return Poll::Ready(Err(SendError::ChannelClosed(value)));
    };

    match shared.offer_or_park(value, || Parker::task(cx.waker())) {
      Parked::Accepted => Poll::Ready(Ok(())),
      Parked::Closed(value) => {
        warn!(
          channel = shared.label(),
          state = %shared.state(),
          "send on a channel that is no longer open"
        );
        Poll::Ready(Err(SendError::ChannelClosed(value)))
      }
      Parked::Waiting(slot) => {
        this.parked = Some((shared, slot));
        Poll::Pending
      }
    }
  }
}

impl<T> Drop for SendFuture<T> {
  fn drop(&mut self) {
    if let Some((shared, slot)) = self.parked.take() {
      if slot.outcome().is_none() {
        shared.withdraw(&slot);
      }
    }
  }
}

impl<T> fmt::Debug for SendFuture<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendFuture")
      .field("started", &self.item.is_none())
      .field("parked", &self.parked.is_some())
      .finish()
  }
}

/// Future returned by [`Producer::closed`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct ClosedFuture<T> {
  channel: Weak<BridgeShared<T>>,
  watcher: Arc<AtomicWaker>,
  enqueued: bool,
}

impl<T> Future for ClosedFuture<T> {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
    let this = self.get_mut();
    let Some(shared) = this.channel.upgrade() else {
      return Poll::Ready(());
    };
    this.watcher.register(cx.waker());
    if shared.watch_close(&this.watcher, &mut this.enqueued) {
      this.enqueued = false;
      Poll::Ready(())
    } else {
      Poll::Pending
    }
  }
}

impl<T> Drop for ClosedFuture<T> {
  fn drop(&mut self) {
    if self.enqueued {
      if let Some(shared) = self.channel.upgrade() {
        shared.unwatch_close(&self.watcher);
      }
    }
  }
}

impl<T> fmt::Debug for ClosedFuture<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ClosedFuture")
      .field("enqueued", &self.enqueued)
      .finish()
  }
}
