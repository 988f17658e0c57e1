//! Bridges a callback-driven timer into an async stream.
//!
//! Run with `RUST_LOG=fibre_bridge=debug cargo run --example callback_source`
//! to watch the channel's lifecycle events.

use fibre_bridge::flow::callback_flow;
use fibre_bridge::{Capacity, Producer, ProducerSlot};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// A stand-in for a third-party event source that only knows callbacks.
struct Ticker {
  running: Arc<AtomicBool>,
  worker: Option<thread::JoinHandle<()>>,
}

impl Ticker {
  fn start<F>(period: Duration, mut on_tick: F) -> Self
  where
    F: FnMut(u32) + Send + 'static,
  {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let worker = thread::spawn(move || {
      let mut tick = 0;
      while flag.load(Ordering::Acquire) {
        thread::sleep(period);
        tick += 1;
        on_tick(tick);
      }
    });
    Ticker {
      running,
      worker: Some(worker),
    }
  }

  fn stop(&mut self) {
    self.running.store(false, Ordering::Release);
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
  }
}

async fn ticks(producer: Producer<u32>) {
  let slot = ProducerSlot::bound(producer.clone());
  let unbind = slot.clone();
  producer.invoke_on_close(move || {
    unbind.unbind();
  });

  let mut ticker = Ticker::start(Duration::from_millis(10), move |tick| {
    // Thread-blocking: a slow consumer slows the ticker instead of losing ticks.
    if slot.send_data_blocking(tick).is_ok() && tick == 10 {
      slot.close();
    }
  });

  producer.closed().await;
  tokio::task::spawn_blocking(move || ticker.stop())
    .await
    .expect("ticker thread panicked");
  tracing::info!("ticker unregistered");
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut stream = callback_flow(Capacity::Rendezvous, ticks);
  while let Some(tick) = stream.next().await {
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("tick {tick}");
  }

  if let Some(err) = stream.take_error() {
    eprintln!("flow ended with error: {err}");
  }
}
