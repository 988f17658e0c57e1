//! Parked sender slots and consumer wakeups.
//!
//! A blocking sender that cannot be accepted right away moves its value into
//! a [`SendSlot`] and pushes the slot onto the channel's FIFO of parked
//! senders. The consumer (or a teardown) later settles the slot with an
//! [`Outcome`] while holding the channel lock, then wakes the sender once the
//! lock is released.
//!
//! Lock order is always channel lock first, slot item lock second.

use futures_util::task::AtomicWaker;
use parking_lot::Mutex;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::Waker;
use std::thread::{self, Thread};

const WAITING: u8 = 0;
const ACCEPTED: u8 = 1;
const REJECTED: u8 = 2;

/// How a parked send was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
  /// The value was taken by the consumer or moved into the buffer.
  Accepted,
  /// The channel was torn down. The value is still in the slot.
  Rejected,
}

/// How to reach a parked sender.
pub(crate) enum Parker {
  Task(AtomicWaker),
  Thread(Thread),
}

impl Parker {
  pub(crate) fn task(waker: &Waker) -> Self {
    let atomic = AtomicWaker::new();
    atomic.register(waker);
    Parker::Task(atomic)
  }

  pub(crate) fn current_thread() -> Self {
    Parker::Thread(thread::current())
  }
}

impl fmt::Debug for Parker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Parker::Task(_) => f.write_str("Parker::Task"),
      Parker::Thread(t) => f.debug_tuple("Parker::Thread").field(&t.id()).finish(),
    }
  }
}

/// A parked sender: its value plus the means to tell it how things went.
pub(crate) struct SendSlot<T> {
  item: Mutex<Option<T>>,
  outcome: AtomicU8,
  parker: Parker,
}

impl<T> SendSlot<T> {
  pub(crate) fn new(item: T, parker: Parker) -> Arc<Self> {
    Arc::new(Self {
      item: Mutex::new(Some(item)),
      outcome: AtomicU8::new(WAITING),
      parker,
    })
  }

  #[inline]
  pub(crate) fn take_item(&self) -> Option<T> {
    self.item.lock().take()
  }

  /// Records the outcome. Must be called with the channel lock held so that
  /// a withdrawing sender sees either a queued slot or a settled one.
  #[inline]
  pub(crate) fn settle(&self, outcome: Outcome) {
    let raw = match outcome {
      Outcome::Accepted => ACCEPTED,
      Outcome::Rejected => REJECTED,
    };
    self.outcome.store(raw, Ordering::Release);
  }

  #[inline]
  pub(crate) fn outcome(&self) -> Option<Outcome> {
    match self.outcome.load(Ordering::Acquire) {
      ACCEPTED => Some(Outcome::Accepted),
      REJECTED => Some(Outcome::Rejected),
      _ => None,
    }
  }

  /// Refreshes the waker of a task-parked sender.
  pub(crate) fn register(&self, waker: &Waker) {
    if let Parker::Task(atomic) = &self.parker {
      atomic.register(waker);
    }
  }

  /// Wakes the parked sender. Call after releasing the channel lock.
  pub(crate) fn unpark(&self) {
    match &self.parker {
      Parker::Task(atomic) => atomic.wake(),
      Parker::Thread(thread) => thread.unpark(),
    }
  }
}

impl<T> fmt::Debug for SendSlot<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SendSlot")
      .field("outcome", &self.outcome())
      .field("parker", &self.parker)
      .finish()
  }
}

/// How to reach the parked consumer, or a task waiting for close.
pub(crate) enum Wakeup {
  Task(Waker),
  Thread {
    thread: Thread,
    notified: Arc<AtomicBool>,
  },
}

impl Wakeup {
  /// Builds a thread wakeup for the current thread along with the flag the
  /// caller should wait on.
  pub(crate) fn current_thread() -> (Self, Arc<AtomicBool>) {
    let notified = Arc::new(AtomicBool::new(false));
    (
      Wakeup::Thread {
        thread: thread::current(),
        notified: notified.clone(),
      },
      notified,
    )
  }

  /// True if waking `self` would wake the same task as `waker`.
  pub(crate) fn will_wake(&self, waker: &Waker) -> bool {
    matches!(self, Wakeup::Task(w) if w.will_wake(waker))
  }

  pub(crate) fn wake(self) {
    match self {
      Wakeup::Task(waker) => waker.wake(),
      Wakeup::Thread { thread, notified } => {
        notified.store(true, Ordering::Release);
        thread.unpark();
      }
    }
  }
}

impl fmt::Debug for Wakeup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Wakeup::Task(_) => f.write_str("Wakeup::Task"),
      Wakeup::Thread { thread, .. } => f.debug_tuple("Wakeup::Thread").field(&thread.id()).finish(),
    }
  }
}
