// src/slot.rs

//! A rebindable holder for a producer, for callback sources that outlive any
//! one channel.

use crate::error::SendError;
use crate::producer::Producer;

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A shared, rebindable reference to a [`Producer`].
///
/// Callback code keeps a clone of the slot and calls [`send_data`](Self::send_data)
/// or [`try_send`](Self::try_send) without caring whether a channel is
/// currently attached. While the slot is unbound every operation is a no-op.
/// The usual pattern is to bind the slot when a consumer starts, and unbind it
/// from the channel's close hook so late callbacks stop touching a dead
/// channel:
///
/// ```
/// use fibre_bridge::ProducerSlot;
///
/// let channel = fibre_bridge::open::<u32>(4);
/// let slot = ProducerSlot::new();
/// slot.bind(channel.producer());
///
/// let unbind = slot.clone();
/// channel.producer().close_with(move || {
///   unbind.unbind();
/// });
/// assert!(!slot.is_bound());
/// assert!(!slot.try_send(1));
/// ```
pub struct ProducerSlot<T> {
  inner: Arc<RwLock<Option<Producer<T>>>>,
}

impl<T> Clone for ProducerSlot<T> {
  fn clone(&self) -> Self {
    ProducerSlot {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T> Default for ProducerSlot<T> {
  fn default() -> Self {
    ProducerSlot {
      inner: Arc::new(RwLock::new(None)),
    }
  }
}

impl<T: Send> ProducerSlot<T> {
  /// Creates an unbound slot.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a slot already bound to `producer`.
  pub fn bound(producer: Producer<T>) -> Self {
    ProducerSlot {
      inner: Arc::new(RwLock::new(Some(producer))),
    }
  }

  /// Binds the slot to `producer`, replacing any previous binding.
  pub fn bind(&self, producer: Producer<T>) {
    *self.inner.write() = Some(producer);
  }

  /// Clears the binding and returns the producer that was bound, if any.
  pub fn unbind(&self) -> Option<Producer<T>> {
    self.inner.write().take()
  }

  pub fn is_bound(&self) -> bool {
    self.inner.read().is_some()
  }

  // Clone out so the lock is never held across a send or a close hook.
  fn current(&self) -> Option<Producer<T>> {
    self.inner.read().clone()
  }

  /// Suspending send through the bound producer. Resolves to `Ok(())` without
  /// doing anything when the slot is unbound.
  ///
  /// # Errors
  ///
  /// Passes through [`SendError::ChannelClosed`] from a bound producer whose
  /// channel is closing or closed.
  pub async fn send_data(&self, value: T) -> Result<(), SendError<T>> {
    match self.current() {
      Some(producer) => producer.send(value).await,
      None => Ok(()),
    }
  }

  /// Thread-blocking counterpart of [`send_data`](Self::send_data).
  pub fn send_data_blocking(&self, value: T) -> Result<(), SendError<T>> {
    match self.current() {
      Some(producer) => producer.send_blocking(value),
      None => Ok(()),
    }
  }

  /// Non-blocking send. Returns `false` when unbound or when the bound
  /// producer refuses the value.
  pub fn try_send(&self, value: T) -> bool {
    self
      .current()
      .is_some_and(|producer| producer.try_send(value))
  }

  /// Closes the bound channel. Returns `false` when unbound.
  pub fn close(&self) -> bool {
    self.current().is_some_and(|producer| producer.close())
  }
}

impl<T> fmt::Debug for ProducerSlot<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProducerSlot")
      .field("bound", &self.inner.read().is_some())
      .finish()
  }
}
