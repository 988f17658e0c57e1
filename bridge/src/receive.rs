// src/receive.rs

//! The consuming side: the channel owner and its lazy, single-pass sequence.

use crate::capacity::Capacity;
use crate::core::{BridgeShared, Park, Take};
use crate::error::TryRecvError;
use crate::internal::backoff;
use crate::internal::waiter::Wakeup;
use crate::producer::Producer;
use crate::state::ChannelState;

use futures_core::{FusedStream, Stream};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

// Owns the channel on behalf of the consumer. Whichever consumer-side value
// holds it last tears the channel down when dropped.
struct ConsumerGuard<T> {
  shared: Arc<BridgeShared<T>>,
}

impl<T> Drop for ConsumerGuard<T> {
  fn drop(&mut self) {
    self.shared.teardown();
  }
}

/// A freshly opened channel: hands out producers and turns into the
/// consumer's [`Receive`] sequence.
///
/// Dropping it (or the `Receive` it becomes) cancels the consumer: the
/// channel jumps to `Closed`, parked sends fail with `ChannelClosed` and
/// close hooks run.
pub struct BridgedChannel<T> {
  guard: ConsumerGuard<T>,
}

impl<T: Send> BridgedChannel<T> {
  pub(crate) fn new(capacity: Capacity, name: Option<String>) -> Self {
    BridgedChannel {
      guard: ConsumerGuard {
        shared: Arc::new(BridgeShared::new(capacity, name)),
      },
    }
  }

  /// Creates a new producer handle. Handles are cheap and do not keep the
  /// channel alive.
  pub fn producer(&self) -> Producer<T> {
    Producer::new(&self.guard.shared)
  }

  /// Starts consuming. The returned sequence is lazy and single-pass; once it
  /// has yielded `None` it stays finished.
  pub fn receive(self) -> Receive<T> {
    Receive {
      guard: self.guard,
      terminated: false,
    }
  }

  /// See [`Producer::close`].
  pub fn close(&self) -> bool {
    self.guard.shared.close(None)
  }

  /// See [`Producer::close_with`].
  pub fn close_with<F>(&self, on_closed: F) -> bool
  where
    F: FnOnce() + Send + 'static,
  {
    self.guard.shared.close(Some(Box::new(on_closed)))
  }

  /// See [`Producer::invoke_on_close`].
  pub fn invoke_on_close<F>(&self, hook: F)
  where
    F: FnOnce() + Send + 'static,
  {
    self.guard.shared.invoke_on_close(Box::new(hook));
  }

  pub fn state(&self) -> ChannelState {
    self.guard.shared.state()
  }

  pub fn capacity(&self) -> Capacity {
    self.guard.shared.capacity
  }

  pub fn name(&self) -> Option<&str> {
    self.guard.shared.name.as_deref()
  }

  pub fn len(&self) -> usize {
    self.guard.shared.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T> fmt::Debug for BridgedChannel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BridgedChannel")
      .field("name", &self.guard.shared.name)
      .field("capacity", &self.guard.shared.capacity)
      .field("internal", &*self.guard.shared.internal.lock())
      .finish()
  }
}

/// The consumer's view of a channel: a lazy sequence of accepted values.
///
/// Each step waits until a value is available, or ends the sequence once the
/// channel is `Closed` and drained. Implements [`Stream`] for async
/// consumers; [`recv_blocking`](Self::recv_blocking) and
/// [`blocking_iter`](Self::blocking_iter) serve thread consumers. All views
/// pull from the same single pass.
///
/// On a rendezvous channel a pending step counts as a waiting consumer. The
/// futures from [`recv`](Self::recv) and [`next`](Self::next) withdraw that
/// registration when dropped early, so racing them against a timeout is
/// safe. A `Stream` combinator that is dropped mid-poll leaves the consumer
/// registered until its next receive attempt.
pub struct Receive<T> {
  guard: ConsumerGuard<T>,
  terminated: bool,
}

impl<T: Send> Receive<T> {
  /// Waits for the next value. `None` means the channel is closed and drained.
  pub fn recv(&mut self) -> RecvFuture<'_, T> {
    RecvFuture {
      receive: self,
      registered: None,
    }
  }

  /// Same as [`recv`](Self::recv). Takes precedence over
  /// `StreamExt::next` so that `rx.next()` is cancellation safe too.
  #[allow(clippy::should_implement_trait)]
  pub fn next(&mut self) -> RecvFuture<'_, T> {
    self.recv()
  }

  /// Takes the next value if one is available right now.
  pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
    if self.terminated {
      return Err(TryRecvError::Closed);
    }
    match self.guard.shared.take(None) {
      Take::Item(item) => Ok(item),
      Take::Empty => Err(TryRecvError::Empty),
      Take::Closed => {
        self.terminated = true;
        Err(TryRecvError::Closed)
      }
    }
  }

  /// Blocks the current thread until the next value arrives or the channel
  /// is closed and drained.
  pub fn recv_blocking(&mut self) -> Option<T> {
    loop {
      if self.terminated {
        return None;
      }
      let (wakeup, notified) = Wakeup::current_thread();
      match self.guard.shared.take(Some(Park::Thread(wakeup))) {
        Take::Item(item) => return Some(item),
        Take::Closed => self.terminated = true,
        Take::Empty => backoff::wait_until(|| notified.load(Ordering::Acquire)),
      }
    }
  }

  /// A blocking iterator over the rest of the sequence.
  pub fn blocking_iter(&mut self) -> BlockingIter<'_, T> {
    BlockingIter { receive: self }
  }

  /// Creates a new producer handle for this channel.
  pub fn producer(&self) -> Producer<T> {
    Producer::new(&self.guard.shared)
  }

  /// See [`Producer::close`]. The sequence keeps yielding what is buffered.
  pub fn close(&self) -> bool {
    self.guard.shared.close(None)
  }

  /// See [`Producer::close_with`].
  pub fn close_with<F>(&self, on_closed: F) -> bool
  where
    F: FnOnce() + Send + 'static,
  {
    self.guard.shared.close(Some(Box::new(on_closed)))
  }

  pub fn state(&self) -> ChannelState {
    self.guard.shared.state()
  }

  pub fn capacity(&self) -> Capacity {
    self.guard.shared.capacity
  }

  pub fn len(&self) -> usize {
    self.guard.shared.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<T: Send> Receive<T> {
  fn poll_take(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
    if self.terminated {
      return Poll::Ready(None);
    }
    match self.guard.shared.take(Some(Park::Task(cx.waker()))) {
      Take::Item(item) => Poll::Ready(Some(item)),
      Take::Empty => Poll::Pending,
      Take::Closed => {
        self.terminated = true;
        Poll::Ready(None)
      }
    }
  }
}

impl<T: Send> Stream for Receive<T> {
  type Item = T;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    self.get_mut().poll_take(cx)
  }
}

impl<T: Send> FusedStream for Receive<T> {
  fn is_terminated(&self) -> bool {
    self.terminated
  }
}

impl<T> fmt::Debug for Receive<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Receive")
      .field("name", &self.guard.shared.name)
      .field("terminated", &self.terminated)
      .field("internal", &*self.guard.shared.internal.lock())
      .finish()
  }
}

/// Future returned by [`Receive::recv`].
///
/// Dropping it while it is still pending takes the consumer off the
/// channel's waiting list.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct RecvFuture<'a, T: Send> {
  receive: &'a mut Receive<T>,
  // The waker the consumer is registered with while pending.
  registered: Option<Waker>,
}

impl<T: Send> Future for RecvFuture<'_, T> {
  type Output = Option<T>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    let this = self.get_mut();
    let poll = this.receive.poll_take(cx);
    this.registered = match poll {
      Poll::Pending => Some(cx.waker().clone()),
      Poll::Ready(_) => None,
    };
    poll
  }
}

impl<T: Send> Drop for RecvFuture<'_, T> {
  fn drop(&mut self) {
    if let Some(waker) = self.registered.take() {
      self.receive.guard.shared.cancel_take(&waker);
    }
  }
}

impl<T: Send> fmt::Debug for RecvFuture<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecvFuture")
      .field("terminated", &self.receive.terminated)
      .field("registered", &self.registered.is_some())
      .finish()
  }
}

/// Blocking iterator returned by [`Receive::blocking_iter`].
pub struct BlockingIter<'a, T> {
  receive: &'a mut Receive<T>,
}

impl<T: Send> Iterator for BlockingIter<'_, T> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    self.receive.recv_blocking()
  }
}

impl<T> fmt::Debug for BlockingIter<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BlockingIter")
      .field("terminated", &self.receive.terminated)
      .finish()
  }
}
