mod common;
use common::*;

use fibre_bridge::flow::{callback_flow, channel_flow, Flow};
use fibre_bridge::{Capacity, FlowError};
use futures_core::FusedStream;
use futures_util::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::time::timeout;

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
  fn drop(&mut self) {
    self.0.store(true, Ordering::SeqCst);
  }
}

async fn wait_for(flag: &AtomicBool) {
  timeout(SHORT_TIMEOUT, async {
    while !flag.load(Ordering::SeqCst) {
      tokio::time::sleep(Duration::from_millis(1)).await;
    }
  })
  .await
  .expect("flag was never set");
}

#[tokio::test]
async fn channel_flow_is_cold_and_ends_after_its_block() {
  let started = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&started);
  let mut flow = channel_flow(Capacity::Rendezvous, move |producer| async move {
    flag.store(true, Ordering::SeqCst);
    for i in 1..=3u32 {
      producer.send(i).await.unwrap();
    }
  });

  tokio::task::yield_now().await;
  assert!(!started.load(Ordering::SeqCst));
  assert!(!flow.is_started());

  let values: Vec<u32> = flow.by_ref().collect().await;
  assert_eq!(values, vec![1, 2, 3]);
  assert!(started.load(Ordering::SeqCst));
  assert!(flow.is_terminated());
  assert_eq!(flow.take_error(), None);
  assert_eq!(flow.next().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn callback_flow_runs_until_the_source_closes() {
  let unregistered = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&unregistered);
  let flow = callback_flow(4, move |producer| async move {
    let source = producer.clone();
    let _timer = thread::spawn(move || {
      for i in 0..ITEMS_LOW as u32 {
        if !source.try_send_blocking(i) {
          return;
        }
      }
      source.close();
    });
    producer.closed().await;
    flag.store(true, Ordering::SeqCst);
  });

  let values: Vec<u32> = timeout(LONG_TIMEOUT, flow.collect())
    .await
    .expect("flow did not finish");
  assert_eq!(values, (0..ITEMS_LOW as u32).collect::<Vec<_>>());
  wait_for(&unregistered).await;
}

#[tokio::test]
async fn callback_flow_without_awaiting_close_reports_it() {
  let mut flow = callback_flow(4, |producer| async move {
    producer.try_send(1u32);
    producer.try_send(2);
  });

  // What was accepted still drains before the flow ends.
  let values: Vec<u32> = flow.by_ref().collect().await;
  assert_eq!(values, vec![1, 2]);
  assert_eq!(flow.take_error(), Some(FlowError::MissingAwaitClose));
  assert_eq!(flow.take_error(), None);
}

#[tokio::test]
async fn channel_flow_may_return_without_awaiting_close() {
  let mut flow = channel_flow(4, |producer| async move {
    producer.try_send(1u32);
  });
  let values: Vec<u32> = flow.by_ref().collect().await;
  assert_eq!(values, vec![1]);
  assert_eq!(flow.take_error(), None);
}

#[tokio::test]
async fn panicking_block_ends_the_flow() {
  let mut flow = channel_flow(4, |producer| async move {
    producer.send(1u32).await.unwrap();
    panic!("source exploded");
  });

  let values: Vec<u32> = timeout(SHORT_TIMEOUT, flow.by_ref().collect())
    .await
    .expect("flow did not end");
  assert_eq!(values, vec![1]);
  assert_eq!(
    flow.take_error(),
    Some(FlowError::ProducerPanicked("source exploded".to_string()))
  );
}

#[tokio::test]
async fn dropping_a_flow_stops_its_block() {
  let stopped = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&stopped);
  let mut flow = callback_flow(Capacity::Rendezvous, move |producer| async move {
    let _guard = SetOnDrop(flag);
    let mut i = 0u32;
    while producer.send(i).await.is_ok() {
      i += 1;
    }
    producer.closed().await;
  });

  assert_eq!(flow.next().await, Some(0));
  assert_eq!(flow.next().await, Some(1));
  drop(flow);
  wait_for(&stopped).await;
}

#[tokio::test]
async fn dropping_a_cold_flow_never_runs_its_block() {
  let started = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&started);
  let flow: Flow<u32> = channel_flow(Capacity::default(), move |_producer| async move {
    flag.store(true, Ordering::SeqCst);
  });
  drop(flow);
  tokio::task::yield_now().await;
  assert!(!started.load(Ordering::SeqCst));
}

#[test]
fn flow_ends_when_its_runtime_cancels_the_block() {
  let producer_rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap();
  let mut flow: Flow<u32> = callback_flow(Capacity::Rendezvous, |producer| async move {
    producer.closed().await;
  });

  // The first poll spawns the block onto the runtime that is polling.
  producer_rt.block_on(async {
    assert!(flow.next().now_or_never().is_none());
    assert!(flow.is_started());
  });
  // Shutting the runtime down cancels the block before it could close.
  drop(producer_rt);

  let consumer_rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap();
  let ended = consumer_rt.block_on(async { timeout(SHORT_TIMEOUT, flow.next()).await });
  assert_eq!(ended, Ok(None));
  assert!(flow.is_terminated());
  assert_eq!(flow.take_error(), None);
}
