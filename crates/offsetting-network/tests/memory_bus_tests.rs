use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use offsetting_network::{Flow, MemoryBus, PubSub};
use tokio::sync::mpsc;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_every_subscriber_receives_broadcast() {
    let bus = MemoryBus::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut handles = Vec::new();
    for n in 0..3 {
        let tx = tx.clone();
        let handle = bus
            .subscribe(
                "status",
                Box::new(move |payload| {
                    let _ = tx.send((n, payload));
                    Flow::Continue
                }),
            )
            .await
            .unwrap();
        handles.push(handle);
    }
    assert_eq!(bus.subscriber_count("status"), 3);

    bus.connect_and_publish("status", b"hello".to_vec()).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (n, payload) = rx.recv().await.unwrap();
        assert_eq!(payload, b"hello".to_vec());
        seen.push(n);
    }
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(bus.published("status"), vec![b"hello".to_vec()]);
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let bus = MemoryBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let _handle = bus
        .subscribe(
            "a",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Flow::Continue
            }),
        )
        .await
        .unwrap();

    bus.connect_and_publish("b", b"x".to_vec()).await.unwrap();
    bus.connect_and_publish("a", b"y".to_vec()).await.unwrap();

    wait_until(|| hits.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_ends_subscription() {
    let bus = MemoryBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let handle = bus
        .subscribe(
            "t",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Flow::Stop
            }),
        )
        .await
        .unwrap();

    bus.inject("t", b"1".to_vec());
    wait_until(|| handle.is_finished()).await;
    bus.inject("t", b"2".to_vec());

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count("t"), 0);
}

#[tokio::test]
async fn test_cancel_stops_delivery() {
    let bus = MemoryBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let handle = bus
        .subscribe(
            "t",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Flow::Continue
            }),
        )
        .await
        .unwrap();

    handle.cancel();
    wait_until(|| bus.subscriber_count("t") == 0).await;
    assert_eq!(bus.inject("t", b"late".to_vec()), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_settle_delay_before_publish() {
    let bus = MemoryBus::with_settle_delay(Duration::from_secs(1));
    let started = tokio::time::Instant::now();
    bus.connect_and_publish("t", b"x".to_vec()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
}
