// src/core.rs

//! The shared state behind every bridged channel.
//!
//! One `parking_lot::Mutex` guards the lifecycle state, the buffer, the FIFO of
//! parked senders, the parked consumer and the close bookkeeping. Every send,
//! receive and close is linearized by that lock, so no caller can observe a
//! torn lifecycle state.
//!
//! ### Close protocol
//!
//! 1. `close` flips `Open -> Closing` under the lock. From then on every new
//!    send is refused: suspending and thread-blocking sends fail with
//!    `ChannelClosed`, try-sends return `false`.
//! 2. Items already buffered, and senders that were already parked, keep
//!    draining to the consumer.
//! 3. Whoever observes the channel drained while `Closing` (the `close` call
//!    itself, the consumer taking the last item, or a parked sender
//!    withdrawing) moves it to `Closed` and runs the close hooks once, after
//!    releasing the lock.
//!
//! Dropping the consumer short-circuits all of this: the channel jumps to
//! `Closed`, buffered items are dropped and parked senders are rejected.

use crate::capacity::Capacity;
use crate::internal::waiter::{Outcome, Parker, SendSlot, Wakeup};
use crate::state::ChannelState;

use futures_util::task::AtomicWaker;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::task::Waker;
use tracing::{debug, trace};

pub(crate) type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// Result of a send that never parks.
#[derive(Debug)]
pub(crate) enum Admit<T> {
  Accepted,
  Full(T),
  Closed(T),
}

/// Result of a send that parks when there is no room.
#[derive(Debug)]
pub(crate) enum Parked<T> {
  Accepted,
  Closed(T),
  Waiting(Arc<SendSlot<T>>),
}

/// Result of a receive attempt.
#[derive(Debug)]
pub(crate) enum Take<T> {
  Item(T),
  Empty,
  Closed,
}

/// How the consumer wants to be woken if nothing is available.
pub(crate) enum Park<'a> {
  Task(&'a Waker),
  Thread(Wakeup),
}

/// Work left over from the transition to `Closed`. Run it after the channel
/// lock has been released; hooks are free to call back into the channel.
#[must_use]
pub(crate) struct Finalized {
  hooks: Vec<CloseHook>,
  watchers: Vec<Arc<AtomicWaker>>,
  receiver: Option<Wakeup>,
}

impl Finalized {
  pub(crate) fn run(self) {
    // Hooks first, so anything woken below already sees the cleanup done.
    for hook in self.hooks {
      hook();
    }
    for watcher in self.watchers {
      watcher.wake();
    }
    if let Some(receiver) = self.receiver {
      receiver.wake();
    }
  }
}

pub(crate) struct ChannelInternal<T> {
  pub(crate) state: ChannelState,
  /// Accepted items not yet handed to the consumer.
  pub(crate) queue: VecDeque<T>,
  /// Blocking senders waiting for room, oldest first.
  pub(crate) waiting_senders: VecDeque<Arc<SendSlot<T>>>,
  /// The consumer, if it is parked waiting for an item.
  pub(crate) waiting_receiver: Option<Wakeup>,
  /// Tasks waiting for the channel to reach `Closed`.
  pub(crate) close_watchers: Vec<Arc<AtomicWaker>>,
  pub(crate) close_hooks: Vec<CloseHook>,
}

impl<T> ChannelInternal<T> {
  fn has_room(&self, capacity: Capacity) -> bool {
    match capacity {
      Capacity::Unbounded => true,
      Capacity::Bounded(n) => self.queue.len() < n,
      // Only a consumer that is parked right now can take a rendezvous item,
      // and it takes exactly one.
      Capacity::Rendezvous => self.waiting_receiver.is_some() && self.queue.is_empty(),
    }
  }

  fn is_drained(&self) -> bool {
    self.queue.is_empty() && self.waiting_senders.is_empty()
  }

  /// Pops the oldest parked sender that still holds its value and accepts it.
  fn admit_parked(&mut self) -> Option<(T, Arc<SendSlot<T>>)> {
    while let Some(slot) = self.waiting_senders.pop_front() {
      if let Some(item) = slot.take_item() {
        slot.settle(Outcome::Accepted);
        return Some((item, slot));
      }
    }
    None
  }

  fn enter_closed(&mut self) -> Finalized {
    self.state = ChannelState::Closed;
    Finalized {
      hooks: mem::take(&mut self.close_hooks),
      watchers: mem::take(&mut self.close_watchers),
      receiver: self.waiting_receiver.take(),
    }
  }

  fn finish_if_drained(&mut self) -> Option<Finalized> {
    if self.state == ChannelState::Closing && self.is_drained() {
      Some(self.enter_closed())
    } else {
      None
    }
  }
}

impl<T> fmt::Debug for ChannelInternal<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelInternal")
      .field("state", &self.state)
      .field("buffered", &self.queue.len())
      .field("waiting_senders", &self.waiting_senders.len())
      .field("receiver_parked", &self.waiting_receiver.is_some())
      .field("close_watchers", &self.close_watchers.len())
      .field("close_hooks", &self.close_hooks.len())
      .finish()
  }
}

/// Owner of the channel state. The consumer side holds the only long-lived
/// strong reference; producers hold `Weak` references.
#[derive(Debug)]
pub(crate) struct BridgeShared<T> {
  pub(crate) internal: Mutex<ChannelInternal<T>>,
  pub(crate) capacity: Capacity,
  pub(crate) name: Option<String>,
}

impl<T> BridgeShared<T> {
  pub(crate) fn new(capacity: Capacity, name: Option<String>) -> Self {
    let capacity = capacity.normalized();
    let initial = match capacity {
      Capacity::Bounded(n) => n.min(1024),
      Capacity::Rendezvous => 1,
      Capacity::Unbounded => 32,
    };
    BridgeShared {
      internal: Mutex::new(ChannelInternal {
        state: ChannelState::Open,
        queue: VecDeque::with_capacity(initial),
        waiting_senders: VecDeque::new(),
        waiting_receiver: None,
        close_watchers: Vec::new(),
        close_hooks: Vec::new(),
      }),
      capacity,
      name,
    }
  }

  #[inline]
  pub(crate) fn label(&self) -> &str {
    self.name.as_deref().unwrap_or("unnamed")
  }

  pub(crate) fn state(&self) -> ChannelState {
    self.internal.lock().state
  }

  pub(crate) fn len(&self) -> usize {
    self.internal.lock().queue.len()
  }

  /// Non-parking send: accepted, or refused because there is no room or the
  /// channel is no longer open.
  pub(crate) fn offer(&self, item: T) -> Admit<T> {
    let mut guard = self.internal.lock();

    if guard.state != ChannelState::Open {
      return Admit::Closed(item);
    }
    // Parked senders are ahead of us in line.
    if !guard.waiting_senders.is_empty() || !guard.has_room(self.capacity) {
      return Admit::Full(item);
    }

    guard.queue.push_back(item);
    let receiver = guard.waiting_receiver.take();
    drop(guard);

    if let Some(receiver) = receiver {
      receiver.wake();
    }
    Admit::Accepted
  }

  /// Parking send. When there is no room the value moves into a slot at the
  /// back of the sender FIFO and the caller waits on that slot.
  pub(crate) fn offer_or_park<P>(&self, item: T, parker: P) -> Parked<T>
  where
    P: FnOnce() -> Parker,
  {
    let mut guard = self.internal.lock();

    if guard.state != ChannelState::Open {
      return Parked::Closed(item);
    }

    if guard.waiting_senders.is_empty() && guard.has_room(self.capacity) {
      guard.queue.push_back(item);
      let receiver = guard.waiting_receiver.take();
      drop(guard);
      if let Some(receiver) = receiver {
        receiver.wake();
      }
      return Parked::Accepted;
    }

    let slot = SendSlot::new(item, parker());
    guard.waiting_senders.push_back(Arc::clone(&slot));
    trace!(
      channel = self.label(),
      parked = guard.waiting_senders.len(),
      "sender parked"
    );
    Parked::Waiting(slot)
  }

  /// Removes a parked sender that gave up waiting. Returns `false` if the
  /// slot had already been settled.
  pub(crate) fn withdraw(&self, slot: &Arc<SendSlot<T>>) -> bool {
    let mut guard = self.internal.lock();
    let Some(pos) = guard.waiting_senders.iter().position(|s| Arc::ptr_eq(s, slot)) else {
      return false;
    };
    guard.waiting_senders.remove(pos);
    // A pending close may have been waiting on this sender only.
    let finalized = guard.finish_if_drained();
    drop(guard);

    trace!(channel = self.label(), "parked sender withdrawn");
    if let Some(finalized) = finalized {
      debug!(channel = self.label(), "channel closed");
      finalized.run();
    }
    true
  }

  /// Takes the next item for the consumer.
  ///
  /// Buffered items come first. Taking one from a full bounded buffer admits
  /// the oldest parked sender into the freed slot. With an empty buffer a
  /// parked sender is handed off directly (the rendezvous path).
  pub(crate) fn take(&self, park: Option<Park<'_>>) -> Take<T> {
    let mut guard = self.internal.lock();
    let mut admitted: Option<Arc<SendSlot<T>>> = None;

    let item = match guard.queue.pop_front() {
      Some(item) => {
        if let Capacity::Bounded(n) = self.capacity {
          if guard.queue.len() < n {
            if let Some((parked_item, slot)) = guard.admit_parked() {
              guard.queue.push_back(parked_item);
              admitted = Some(slot);
            }
          }
        }
        Some(item)
      }
      None => guard.admit_parked().map(|(item, slot)| {
        admitted = Some(slot);
        item
      }),
    };

    if let Some(item) = item {
      let finalized = guard.finish_if_drained();
      drop(guard);

      if let Some(slot) = admitted {
        slot.unpark();
      }
      if let Some(finalized) = finalized {
        debug!(channel = self.label(), "channel drained and closed");
        finalized.run();
      }
      return Take::Item(item);
    }

    match guard.state {
      ChannelState::Open => {
        match park {
          Some(Park::Task(waker)) => {
            let same = guard
              .waiting_receiver
              .as_ref()
              .is_some_and(|w| w.will_wake(waker));
            if !same {
              guard.waiting_receiver = Some(Wakeup::Task(waker.clone()));
            }
          }
          Some(Park::Thread(wakeup)) => guard.waiting_receiver = Some(wakeup),
          // A consumer that polls without parking is not waiting.
          None => guard.waiting_receiver = None,
        }
        Take::Empty
      }
      ChannelState::Closing => {
        // Drained while closing.
        let finalized = guard.enter_closed();
        drop(guard);
        debug!(channel = self.label(), "channel closed");
        finalized.run();
        Take::Closed
      }
      ChannelState::Closed => Take::Closed,
    }
  }

  /// Requests a close. Returns `true` if this call moved the channel out of
  /// `Open`; any other call is a no-op and drops `hook` unrun.
  /// Withdraws the consumer's task registration after its receive future
  /// was dropped before completing.
  ///
  /// Leaves a newer registration from a different task in place.
  pub(crate) fn cancel_take(&self, waker: &Waker) {
    let mut guard = self.internal.lock();
    let registered = guard
      .waiting_receiver
      .as_ref()
      .is_some_and(|w| w.will_wake(waker));
    if registered {
      guard.waiting_receiver = None;
      trace!(channel = self.label(), "consumer stopped waiting");
    }
  }

  pub(crate) fn close(&self, hook: Option<CloseHook>) -> bool {
    let mut guard = self.internal.lock();

    if guard.state != ChannelState::Open {
      let state = guard.state;
      drop(guard);
      drop(hook);
      trace!(channel = self.label(), %state, "close ignored");
      return false;
    }

    guard.state = ChannelState::Closing;
    if let Some(hook) = hook {
      guard.close_hooks.push(hook);
    }
    debug!(
      channel = self.label(),
      capacity = ?self.capacity,
      buffered = guard.queue.len(),
      parked = guard.waiting_senders.len(),
      "channel closing"
    );
    let finalized = guard.finish_if_drained();
    drop(guard);

    if let Some(finalized) = finalized {
      debug!(channel = self.label(), "channel closed");
      finalized.run();
    }
    true
  }

  /// Consumer went away: close immediately without draining.
  pub(crate) fn teardown(&self) {
    let mut guard = self.internal.lock();
    if guard.state == ChannelState::Closed {
      return;
    }

    let dropped = mem::take(&mut guard.queue);
    let rejected = mem::take(&mut guard.waiting_senders);
    for slot in &rejected {
      slot.settle(Outcome::Rejected);
    }
    let finalized = guard.enter_closed();
    drop(guard);

    debug!(
      channel = self.label(),
      dropped = dropped.len(),
      rejected = rejected.len(),
      "channel torn down by consumer"
    );
    drop(dropped);
    for slot in rejected {
      slot.unpark();
    }
    finalized.run();
  }

  /// Registers a hook to run once the channel is `Closed`. Runs it right away
  /// if that already happened.
  pub(crate) fn invoke_on_close(&self, hook: CloseHook) {
    let mut guard = self.internal.lock();
    if guard.state == ChannelState::Closed {
      drop(guard);
      hook();
    } else {
      guard.close_hooks.push(hook);
    }
  }

  /// Returns `true` once the channel is `Closed`; otherwise makes sure
  /// `watcher` will be woken when it gets there.
  pub(crate) fn watch_close(&self, watcher: &Arc<AtomicWaker>, enqueued: &mut bool) -> bool {
    let mut guard = self.internal.lock();
    if guard.state == ChannelState::Closed {
      return true;
    }
    if !*enqueued {
      guard.close_watchers.push(Arc::clone(watcher));
      *enqueued = true;
    }
    false
  }

  pub(crate) fn unwatch_close(&self, watcher: &Arc<AtomicWaker>) {
    self
      .internal
      .lock()
      .close_watchers
      .retain(|w| !Arc::ptr_eq(w, watcher));
  }
}
