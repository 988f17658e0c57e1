//! Thread-side waiting for the blocking send and receive paths.

use std::hint;
use std::thread;

const SPIN_STEPS: u32 = 6;
const YIELD_STEPS: u32 = 10;

/// Escalating backoff: exponential spinning, then yielding the time slice.
/// Once both are exhausted the caller is expected to park.
pub(crate) struct Backoff {
  step: u32,
}

impl Backoff {
  pub(crate) fn new() -> Self {
    Backoff { step: 0 }
  }

  /// Waits a little. Returns `false` when it is time to park instead.
  pub(crate) fn snooze(&mut self) -> bool {
    if self.step < SPIN_STEPS {
      for _ in 0..(1u32 << self.step) {
        hint::spin_loop();
      }
    } else if self.step < SPIN_STEPS + YIELD_STEPS {
      thread::yield_now();
    } else {
      return false;
    }
    self.step += 1;
    true
  }
}

/// Blocks the current thread until `done` returns `true`.
///
/// Whoever makes `done` true must unpark this thread afterwards, or the final
/// phase may sleep forever. Spurious unparks just loop back around.
pub(crate) fn wait_until<F>(done: F)
where
  F: Fn() -> bool,
{
  let mut backoff = Backoff::new();
  while !done() {
    if !backoff.snooze() {
      thread::park();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[test]
  fn backoff_gives_up_after_spinning_and_yielding() {
    let mut backoff = Backoff::new();
    let mut rounds = 0;
    while backoff.snooze() {
      rounds += 1;
    }
    assert_eq!(rounds, SPIN_STEPS + YIELD_STEPS);
    assert!(!backoff.snooze());
  }

  #[test]
  fn wait_until_wakes_on_unpark() {
    let flag = Arc::new(AtomicBool::new(false));
    let waiter = thread::current();
    let setter = {
      let flag = Arc::clone(&flag);
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::Release);
        waiter.unpark();
      })
    };
    wait_until(|| flag.load(Ordering::Acquire));
    assert!(flag.load(Ordering::Acquire));
    setter.join().unwrap();
  }
}
