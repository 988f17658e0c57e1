mod common;
use common::*;

use fibre_bridge::{Capacity, ChannelState, TryRecvError};
use futures_core::FusedStream;
use futures_util::{FutureExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::time::timeout;

// --- Helper for ordered single-producer delivery ---
async fn assert_delivered_in_order(capacity: Capacity, items: usize) {
  let channel = fibre_bridge::open::<usize>(capacity);
  let producer = channel.producer();
  let rx = channel.receive();

  let sender = tokio::spawn(async move {
    for i in 0..items {
      producer.send(i).await.unwrap();
    }
    producer.close();
  });

  let received: Vec<usize> = timeout(LONG_TIMEOUT, rx.collect())
    .await
    .expect("consumer timed out");
  sender.await.unwrap();
  assert_eq!(received, (0..items).collect::<Vec<_>>(), "capacity {:?}", capacity);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn suspending_send_preserves_order_for_every_capacity() {
  for capacity in [
    Capacity::Rendezvous,
    Capacity::Bounded(1),
    Capacity::Bounded(4),
    Capacity::Bounded(ITEMS_LOW),
    Capacity::Unbounded,
  ] {
    assert_delivered_in_order(capacity, ITEMS_MEDIUM).await;
  }
}

#[tokio::test]
async fn rendezvous_try_send_needs_a_waiting_consumer() {
  let channel = fibre_bridge::open::<u8>(0);
  let producer = channel.producer();
  let mut rx = channel.receive();

  assert!(!producer.try_send(1));

  let mut next = rx.next();
  assert!((&mut next).now_or_never().is_none());
  assert!(producer.try_send(2));
  // The waiting consumer takes exactly one value.
  assert!(!producer.try_send(3));
  assert_eq!(next.await, Some(2));
}

#[tokio::test(start_paused = true)]
async fn timed_out_receive_stops_waiting() {
  let channel = fibre_bridge::open::<u8>(Capacity::Rendezvous);
  let producer = channel.producer();
  let mut rx = channel.receive();

  assert!(timeout(Duration::from_millis(5), rx.next()).await.is_err());
  assert!(!producer.try_send(1));
  assert!(timeout(Duration::from_millis(5), rx.recv()).await.is_err());
  assert!(!producer.try_send(1));

  // A suspending send parks until the consumer asks again.
  let mut pending = producer.send(2);
  assert!((&mut pending).now_or_never().is_none());
  assert_eq!(producer.len(), 0);
  assert_eq!(rx.recv().await, Some(2));
  assert!(pending.await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn losing_a_select_race_stops_waiting() {
  let channel = fibre_bridge::open::<u8>(Capacity::Rendezvous);
  let producer = channel.producer();
  let mut rx = channel.receive();

  tokio::select! {
    _ = rx.recv() => panic!("nothing was sent"),
    _ = tokio::time::sleep(Duration::from_millis(5)) => {}
  }
  assert!(!producer.try_send(1));

  let consumer = tokio::spawn(async move { rx.recv().await });
  tokio::task::yield_now().await;
  assert!(producer.try_send(2));
  assert_eq!(consumer.await.unwrap(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn stream_registration_ends_at_the_next_attempt() {
  let channel = fibre_bridge::open::<u8>(Capacity::Rendezvous);
  let producer = channel.producer();
  let mut rx = channel.receive();

  // Polled through the Stream trait, the consumer stays registered until it
  // tries again.
  let polled = timeout(Duration::from_millis(5), StreamExt::next(&mut rx)).await;
  assert!(polled.is_err());
  assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
  assert!(!producer.try_send(1));
}

#[test]
fn bounded_try_send_drops_when_full() {
  let channel = fibre_bridge::open::<u8>(2);
  let producer = channel.producer();
  assert!(producer.try_send(1));
  assert!(producer.try_send(2));
  assert!(!producer.try_send(3));
  assert_eq!(channel.len(), 2);
  assert_eq!(producer.len(), 2);

  let mut rx = channel.receive();
  assert_eq!(rx.try_recv(), Ok(1));
  assert!(producer.try_send(4));
  assert_eq!(rx.try_recv(), Ok(2));
  assert_eq!(rx.try_recv(), Ok(4));
  assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn unbounded_never_refuses_while_open() {
  let channel = fibre_bridge::open::<usize>(Capacity::Unbounded);
  let producer = channel.producer();
  for i in 0..ITEMS_HIGH {
    assert!(producer.try_send(i));
  }
  assert_eq!(channel.len(), ITEMS_HIGH);
}

#[test]
fn try_recv_reports_empty_then_closed() {
  let channel = fibre_bridge::open::<u8>(2);
  let producer = channel.producer();
  let mut rx = channel.receive();

  assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
  assert!(producer.try_send(7));
  assert_eq!(rx.try_recv(), Ok(7));
  assert!(producer.close());
  assert_eq!(rx.state(), ChannelState::Closed);
  assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
  assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
}

#[test]
fn blocking_iter_drains_a_thread_producer() {
  for capacity in [Capacity::Rendezvous, Capacity::Bounded(4)] {
    let channel = fibre_bridge::open::<usize>(capacity);
    let producer = channel.producer();
    let mut rx = channel.receive();

    let handle = thread::spawn(move || {
      for i in 0..ITEMS_HIGH {
        producer.send_blocking(i).unwrap();
      }
      producer.close();
    });

    let received: Vec<usize> = rx.blocking_iter().collect();
    handle.join().unwrap();
    assert_eq!(received, (0..ITEMS_HIGH).collect::<Vec<_>>());
    assert_eq!(rx.recv_blocking(), None);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_producers_deliver_everything() {
  let channel = fibre_bridge::open::<usize>(8);
  let mut rx = channel.receive();
  let num_producers = 8;
  let sum = Arc::new(AtomicUsize::new(0));

  let mut handles = Vec::new();
  for _ in 0..num_producers {
    let producer = rx.producer();
    handles.push(tokio::spawn(async move {
      for i in 1..=ITEMS_MEDIUM {
        producer.send(i).await.unwrap();
      }
    }));
  }

  let consumer = {
    let sum = Arc::clone(&sum);
    async move {
      let mut count = 0;
      while count < num_producers * ITEMS_MEDIUM {
        let item = rx.recv().await.expect("channel ended early");
        sum.fetch_add(item, Ordering::Relaxed);
        count += 1;
      }
      rx
    }
  };

  let rx = timeout(STRESS_TIMEOUT, consumer).await.expect("stress test timed out");
  for handle in handles {
    handle.await.unwrap();
  }
  let expected = num_producers * ITEMS_MEDIUM * (ITEMS_MEDIUM + 1) / 2;
  assert_eq!(sum.load(Ordering::Relaxed), expected);
  assert!(rx.is_empty());
}

#[tokio::test]
async fn receive_stays_finished_once_ended() {
  let channel = fibre_bridge::open::<u8>(1);
  let producer = channel.producer();
  let mut rx = channel.receive();

  producer.send(1).await.unwrap();
  producer.close();
  assert!(!rx.is_terminated());
  assert_eq!(rx.recv().await, Some(1));
  assert_eq!(rx.recv().await, None);
  assert!(rx.is_terminated());
  assert_eq!(rx.next().await, None);
  assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
}

#[test]
fn producers_do_not_keep_the_channel_alive() {
  let channel = fibre_bridge::open::<u8>(4);
  let producer = channel.producer();
  assert_eq!(producer.state(), ChannelState::Open);
  drop(channel);

  assert_eq!(producer.state(), ChannelState::Closed);
  assert!(producer.is_closed());
  assert!(!producer.try_send(1));
  assert!(!producer.try_send_blocking(2));
  assert_eq!(producer.send_blocking(3).unwrap_err().into_inner(), 3);
  assert!(!producer.close());
}

#[test]
fn builder_names_the_channel() {
  let channel = fibre_bridge::ChannelBuilder::new()
    .name("sensor")
    .capacity(3)
    .open::<u8>();
  assert_eq!(channel.name(), Some("sensor"));
  assert_eq!(channel.capacity(), Capacity::Bounded(3));
  assert_eq!(channel.producer().capacity(), Capacity::Bounded(3));

  let anonymous = fibre_bridge::open::<u8>(Capacity::Bounded(0));
  assert_eq!(anonymous.name(), None);
  assert_eq!(anonymous.capacity(), Capacity::Rendezvous);
}
