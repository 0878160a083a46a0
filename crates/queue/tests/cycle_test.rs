//! End-to-end polling cycles: a channel queue in, a channel sink out.
//!
//! Covers batch size and time bounds, ordering, back-pressure, counter
//! totals, failure handling and stopping an in-flight cycle.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use flowbatch_core::SourceConfig;
use flowbatch_queue::{
    channel, ChannelQueue, ChannelSink, Event, PollableSource, QueueMessage, QueueProducer, Status,
};

const TIMEOUT: Duration = Duration::from_secs(5);

type TestSource = PollableSource<ChannelQueue, ChannelSink>;

fn setup(
    batch_size: usize,
    batch_duration_ms: u64,
) -> (QueueProducer, TestSource, mpsc::Receiver<Vec<Event>>) {
    let (producer, queue) = channel();
    let (sink, batches) = ChannelSink::new(64);
    let mut source = PollableSource::new("cycle-test", queue, sink);
    source
        .configure(SourceConfig {
            batch_size,
            batch_duration_ms,
            ..SourceConfig::default()
        })
        .unwrap();
    source.start();
    (producer, source, batches)
}

fn push_bodies(producer: &QueueProducer, bodies: impl IntoIterator<Item = String>) {
    for body in bodies {
        producer.push(QueueMessage::with_payload("body", body)).unwrap();
    }
}

fn bodies(batch: &[Event]) -> Vec<String> {
    batch
        .iter()
        .map(|e| String::from_utf8_lossy(e.body()).into_owned())
        .collect()
}

async fn cycle(source: &mut TestSource) -> Status {
    timeout(TIMEOUT, source.process()).await.expect("cycle finished")
}

#[tokio::test]
async fn five_items_batch_of_three() {
    let (producer, mut source, mut batches) = setup(3, 1000);
    push_bodies(&producer, (1..=5).map(|i| format!("item-{i}")));

    assert_eq!(cycle(&mut source).await, Status::Ready);
    assert_eq!(bodies(&batches.recv().await.unwrap()), ["item-1", "item-2", "item-3"]);

    assert_eq!(cycle(&mut source).await, Status::Ready);
    assert_eq!(bodies(&batches.recv().await.unwrap()), ["item-4", "item-5"]);

    assert_eq!(cycle(&mut source).await, Status::Backoff);
    assert!(batches.try_recv().is_err());

    let snap = source.counter().snapshot();
    assert_eq!(snap.events_received, 5);
    assert_eq!(snap.batches_dispatched, 2);
    assert_eq!(snap.failures, 0);
}

#[tokio::test]
async fn slow_producer_returns_partial_batch_at_deadline() {
    let (producer, mut source, mut batches) = setup(1000, 50);
    let feeder = tokio::spawn(async move {
        producer.push(QueueMessage::with_payload("body", "first")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        producer.push(QueueMessage::with_payload("body", "second")).unwrap();
        // hold the producer past the cycle
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let started = Instant::now();
    assert_eq!(cycle(&mut source).await, Status::Ready);
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(50), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "returned late: {elapsed:?}");
    assert_eq!(bodies(&batches.recv().await.unwrap()), ["first", "second"]);
    feeder.abort();
}

#[tokio::test]
async fn missing_payload_fails_cycle_without_dispatch() {
    let (producer, mut source, mut batches) = setup(10, 100);
    producer.push(QueueMessage::with_payload("body", "good")).unwrap();
    producer.push(QueueMessage::with_payload("headers", "no body")).unwrap();
    producer.push(QueueMessage::with_payload("body", "later")).unwrap();

    assert_eq!(cycle(&mut source).await, Status::Backoff);
    assert!(batches.try_recv().is_err(), "partial batch must not be dispatched");

    let snap = source.counter().snapshot();
    assert_eq!(snap.failures, 1);
    assert_eq!(snap.transform_failures, 1);
    assert_eq!(snap.events_received, 0);
    // the item appended before the failure is gone
    assert_eq!(snap.events_discarded, 1);
    assert!(snap.last_failure.is_some());

    // the queue is untouched past the bad message
    assert_eq!(cycle(&mut source).await, Status::Ready);
    assert_eq!(bodies(&batches.recv().await.unwrap()), ["later"]);
    assert_eq!(source.counter().failures(), 1);
}

#[tokio::test]
async fn batches_never_exceed_size_and_keep_order() {
    for batch_size in [1, 2, 5, 7] {
        let (producer, mut source, mut batches) = setup(batch_size, 20);
        let sent: Vec<String> = (0..20).map(|i| format!("m{i:02}")).collect();
        push_bodies(&producer, sent.clone());

        let mut seen = Vec::new();
        let mut sizes = Vec::new();
        while cycle(&mut source).await == Status::Ready {
            let batch = batches.recv().await.unwrap();
            assert!(batch.len() <= batch_size, "batch of {} with max {batch_size}", batch.len());
            sizes.push(batch.len() as u64);
            seen.extend(bodies(&batch));
        }

        assert_eq!(seen, sent);
        assert_eq!(source.counter().events_received(), sizes.iter().sum::<u64>());
        assert_eq!(source.counter().failures(), 0);
    }
}

#[tokio::test]
async fn empty_queue_backs_off_within_budget() {
    let (_producer, mut source, mut batches) = setup(10, 30);

    let started = Instant::now();
    assert_eq!(cycle(&mut source).await, Status::Backoff);
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(batches.try_recv().is_err());
    assert_eq!(source.counter().events_received(), 0);
}

#[tokio::test]
async fn busy_queue_still_respects_deadline() {
    let (producer, mut source, mut batches) = setup(usize::MAX, 50);
    let feeder = tokio::spawn(async move {
        let mut i = 0u64;
        loop {
            if producer.push(QueueMessage::with_payload("body", i)).is_err() {
                return;
            }
            i += 1;
            tokio::task::yield_now().await;
        }
    });

    let started = Instant::now();
    let status = cycle(&mut source).await;
    let elapsed = started.elapsed();
    feeder.abort();

    assert_eq!(status, Status::Ready);
    assert!(elapsed < Duration::from_millis(400), "cycle overran: {elapsed:?}");
    let batch = batches.recv().await.unwrap();
    assert!(!batch.is_empty());
    assert_eq!(batch[0], Event::with_body("0"));
}

#[tokio::test]
async fn stop_handle_ends_in_flight_cycle() {
    let (producer, mut source, mut batches) = setup(100, 30_000);
    push_bodies(&producer, ["x".to_string(), "y".to_string()]);

    let handle = source.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
    });

    let started = Instant::now();
    assert_eq!(cycle(&mut source).await, Status::Ready);
    assert!(started.elapsed() < Duration::from_secs(2));
    // what was appended before the stop is still delivered
    assert_eq!(bodies(&batches.recv().await.unwrap()), ["x", "y"]);
}

#[tokio::test]
async fn closed_queue_counts_queue_failures() {
    let (producer, mut source, _batches) = setup(10, 20);
    drop(producer);

    assert_eq!(cycle(&mut source).await, Status::Backoff);
    assert_eq!(cycle(&mut source).await, Status::Backoff);
    let snap = source.counter().snapshot();
    assert_eq!(snap.failures, 2);
    assert_eq!(snap.queue_failures, 2);
}
