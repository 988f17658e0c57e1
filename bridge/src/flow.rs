// src/flow.rs

//! Cold streams backed by a bridged channel and a spawned producer block.
//!
//! [`channel_flow`] runs an async producer block on the tokio runtime the
//! first time the stream is polled, and closes the channel once the block
//! returns. [`callback_flow`] is the shape for callback sources: the block
//! registers callbacks that feed the [`Producer`], then parks on
//! [`Producer::closed`] until the consumer is done, and unregisters.
//!
//! ```no_run
//! use fibre_bridge::flow::callback_flow;
//! use futures_util::StreamExt;
//!
//! # async fn demo() {
//! let mut ticks = callback_flow(8, |producer| async move {
//!   let source = producer.clone();
//!   let timer = std::thread::spawn(move || {
//!     for i in 0..3u32 {
//!       if !source.try_send_blocking(i) {
//!         break;
//!       }
//!     }
//!     source.close();
//!   });
//!   producer.closed().await;
//!   let _ = timer.join();
//! });
//! while let Some(tick) = ticks.next().await {
//!   println!("tick {tick}");
//! }
//! # }
//! ```

use crate::capacity::Capacity;
use crate::error::FlowError;
use crate::producer::Producer;
use crate::receive::{BridgedChannel, Receive};

use futures_core::{FusedStream, Stream};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

type Block<T> = Box<dyn FnOnce(Producer<T>) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
  Channel,
  Callback,
}

enum Stage<T> {
  Cold {
    channel: BridgedChannel<T>,
    block: Block<T>,
  },
  Running {
    receive: Receive<T>,
    task: Option<JoinHandle<()>>,
  },
  Done,
}

/// A cold stream whose values come from a producer block.
///
/// Nothing runs until the first poll, which spawns the block with
/// `tokio::spawn`. Dropping the flow aborts the block if it is still running
/// and tears the channel down.
///
/// # Panics
///
/// The first poll panics if it does not happen inside a tokio runtime.
pub struct Flow<T> {
  stage: Stage<T>,
  mode: Mode,
  error: Arc<Mutex<Option<FlowError>>>,
}

/// Builds a cold flow from an async producer block. The channel is closed
/// when the block returns, so the flow ends after draining what the block
/// sent.
pub fn channel_flow<T, F, Fut>(capacity: impl Into<Capacity>, block: F) -> Flow<T>
where
  T: Send + 'static,
  F: FnOnce(Producer<T>) -> Fut + Send + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  Flow::new(Mode::Channel, capacity.into(), block)
}

/// Builds a cold flow for callback driven sources.
///
/// The block must keep running until the channel is closed, typically by
/// ending with `producer.closed().await`. A block that returns while the
/// channel is still open breaks that contract: the flow drains what was
/// already accepted and then ends, and [`Flow::take_error`] reports
/// [`FlowError::MissingAwaitClose`].
pub fn callback_flow<T, F, Fut>(capacity: impl Into<Capacity>, block: F) -> Flow<T>
where
  T: Send + 'static,
  F: FnOnce(Producer<T>) -> Fut + Send + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  Flow::new(Mode::Callback, capacity.into(), block)
}

impl<T: Send + 'static> Flow<T> {
  fn new<F, Fut>(mode: Mode, capacity: Capacity, block: F) -> Self
  where
    F: FnOnce(Producer<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    Flow {
      stage: Stage::Cold {
        channel: crate::open(capacity),
        block: Box::new(move |producer| block(producer).boxed()),
      },
      mode,
      error: Arc::new(Mutex::new(None)),
    }
  }

  /// Returns `true` once the producer block has been spawned.
  pub fn is_started(&self) -> bool {
    !matches!(self.stage, Stage::Cold { .. })
  }

  /// Takes the error that ended the flow, if any.
  pub fn take_error(&self) -> Option<FlowError> {
    self.error.lock().take()
  }

  fn start(&mut self) {
    let (channel, block) = match mem::replace(&mut self.stage, Stage::Done) {
      Stage::Cold { channel, block } => (channel, block),
      other => {
        self.stage = other;
        return;
      }
    };
    let producer = channel.producer();
    let mode = self.mode;
    let error = Arc::clone(&self.error);
    let body = block(producer.clone());

    debug!(?mode, capacity = ?channel.capacity(), "starting flow producer");
    let task = tokio::spawn(async move {
      body.await;
      if mode == Mode::Callback && producer.state().is_open() {
        error!("callback_flow block returned without awaiting close");
        *error.lock() = Some(FlowError::MissingAwaitClose);
      }
      producer.close();
    });

    self.stage = Stage::Running {
      receive: channel.receive(),
      task: Some(task),
    };
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

impl<T: Send + 'static> Stream for Flow<T> {
  type Item = T;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    let this = self.get_mut();
    if matches!(this.stage, Stage::Cold { .. }) {
      this.start();
    }

    let Stage::Running { receive, task } = &mut this.stage else {
      return Poll::Ready(None);
    };

    if let Some(handle) = task {
      if let Poll::Ready(joined) = Pin::new(handle).poll(cx) {
        *task = None;
        if let Err(err) = joined {
          if err.is_panic() {
            let message = panic_message(err.into_panic());
            error!(%message, "flow producer block panicked");
            *this.error.lock() = Some(FlowError::ProducerPanicked(message));
          } else {
            warn!("flow producer task was cancelled");
          }
          receive.close();
        }
      }
    }

    match Pin::new(receive).poll_next(cx) {
      Poll::Ready(None) => {
        // Detach: a callback block may still be unregistering after close.
        this.stage = Stage::Done;
        Poll::Ready(None)
      }
      other => other,
    }
  }
}

impl<T: Send + 'static> FusedStream for Flow<T> {
  fn is_terminated(&self) -> bool {
    matches!(self.stage, Stage::Done)
  }
}

impl<T> Drop for Flow<T> {
  fn drop(&mut self) {
    if let Stage::Running { task: Some(handle), .. } = &self.stage {
      handle.abort();
    }
  }
}

impl<T> fmt::Debug for Flow<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let stage = match self.stage {
      Stage::Cold { .. } => "cold",
      Stage::Running { .. } => "running",
      Stage::Done => "done",
    };
    f.debug_struct("Flow")
      .field("mode", &self.mode)
      .field("stage", &stage)
      .field("error", &*self.error.lock())
      .finish()
  }
}
