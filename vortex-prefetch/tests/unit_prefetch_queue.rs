//! Unit tests for the bounded prefetch queue

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use vortex_prefetch::data::{Identity, InMemoryDataset, PrefetchQueue, QueueConfig, Split};
use vortex_prefetch::{Result, TrainerError};

fn numbered(n: u32) -> Arc<InMemoryDataset<u32>> {
    let labels = (0..n).map(|i| vec![(i % 2) as f32]).collect();
    Arc::new(InMemoryDataset::from_parts((0..n).collect(), labels).unwrap())
}

fn config(batch_size: usize, capacity: usize, shuffle: bool) -> QueueConfig {
    QueueConfig {
        batch_size,
        capacity,
        shuffle,
        seed: 42,
    }
}

/// Poll until `condition` holds or two seconds pass
async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequential_order_matches_dataset() {
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Test,
        numbered(25),
        Arc::new(Identity),
        config(5, 4, false),
    )
    .unwrap();

    let mut seen = Vec::new();
    for _ in 0..5 {
        let batch = queue.dequeue().await.unwrap();
        assert_eq!(batch.len(), 5);
        seen.extend(batch.examples);
    }
    assert_eq!(seen, (0..25).collect::<Vec<_>>());

    // Production cycles back to the start of the dataset
    let batch = queue.dequeue().await.unwrap();
    assert_eq!(batch.examples, vec![0, 1, 2, 3, 4]);

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batches_never_short() {
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(7),
        Arc::new(Identity),
        config(3, 2, true),
    )
    .unwrap();

    for _ in 0..20 {
        let batch = queue.dequeue().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.labels.len(), 3);
    }

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_buffer_fills_to_capacity_and_no_further() {
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(100),
        Arc::new(Identity),
        config(4, 3, true),
    )
    .unwrap();
    let status = queue.status();

    assert!(wait_until(|| status.pending() == 3).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(status.pending(), 3);
    assert_eq!(status.stats().batches_produced, 3);

    queue.dequeue().await.unwrap();
    assert!(wait_until(|| status.stats().batches_produced == 4).await);
    assert!(status.stats().high_water_mark <= 3);

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_is_idempotent() {
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Val,
        numbered(10),
        Arc::new(Identity),
        config(2, 2, true),
    )
    .unwrap();

    queue.close();
    queue.close();
    assert!(queue.is_closed());

    let err = queue.dequeue().await.unwrap_err();
    assert!(matches!(err, TrainerError::QueueClosed { split: Split::Val }));

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_releases_producer_blocked_on_full_queue() {
    let queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(10),
        Arc::new(Identity),
        config(2, 1, true),
    )
    .unwrap();
    let status = queue.status();

    // Producer has filled the single slot and is waiting for another
    assert!(wait_until(|| status.pending() == 1 && status.is_producer_running()).await);

    tokio::time::timeout(Duration::from_secs(2), queue.shutdown())
        .await
        .expect("shutdown must not deadlock");

    let stats = status.stats();
    assert!(stats.closed);
    assert!(!stats.producer_running);
    assert_eq!(stats.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_after_consumer_gave_up_waiting() {
    let slow = |x: u32| -> Result<u32> {
        std::thread::sleep(Duration::from_millis(50));
        Ok(x)
    };
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(100),
        Arc::new(slow),
        config(10, 2, false),
    )
    .unwrap();
    let status = queue.status();

    // Consumer is blocked on an empty queue and is cancelled
    let waited = tokio::time::timeout(Duration::from_millis(20), queue.dequeue()).await;
    assert!(waited.is_err());

    tokio::time::timeout(Duration::from_secs(5), queue.shutdown())
        .await
        .expect("shutdown must not deadlock");
    assert!(!status.is_producer_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_producer_failure_surfaces_on_dequeue() {
    let failing = |x: u32| -> Result<u32> {
        if x == 7 {
            Err(TrainerError::preprocess("corrupt example 7"))
        } else {
            Ok(x)
        }
    };
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(20),
        Arc::new(failing),
        config(5, 4, false),
    )
    .unwrap();

    let first = queue.dequeue().await.unwrap();
    assert_eq!(first.examples, vec![0, 1, 2, 3, 4]);

    let err = queue.dequeue().await.unwrap_err();
    match err {
        TrainerError::ProducerFailed { split, source } => {
            assert_eq!(split, Split::Train);
            assert!(matches!(*source, TrainerError::Preprocess { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Producer is gone, the queue reports end of stream
    let err = queue.dequeue().await.unwrap_err();
    assert!(matches!(err, TrainerError::QueueClosed { .. }));

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_transform_surfaces_as_producer_failure() {
    let panicking = |x: u32| -> Result<u32> {
        if x == 7 {
            panic!("cannot decode example 7");
        }
        Ok(x)
    };
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(20),
        Arc::new(panicking),
        config(5, 4, false),
    )
    .unwrap();

    let first = queue.dequeue().await.unwrap();
    assert_eq!(first.examples, vec![0, 1, 2, 3, 4]);

    let err = tokio::time::timeout(Duration::from_secs(2), queue.dequeue())
        .await
        .expect("dequeue must not stall")
        .unwrap_err();
    assert!(err.is_producer_failure());
    match err {
        TrainerError::ProducerFailed { split, source } => {
            assert_eq!(split, Split::Train);
            let message = source.to_string();
            assert!(message.contains("panicked"), "{message}");
            assert!(message.contains("cannot decode example 7"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = queue.dequeue().await.unwrap_err();
    assert!(matches!(err, TrainerError::QueueClosed { .. }));

    let status = queue.status();
    queue.shutdown().await;
    assert!(!status.is_producer_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_dataset_fails_instead_of_stalling() {
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Test,
        numbered(0),
        Arc::new(Identity),
        config(5, 4, false),
    )
    .unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), queue.dequeue())
        .await
        .expect("dequeue must not stall")
        .unwrap_err();
    assert!(err.is_producer_failure());

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_each_example_preprocessed_once_per_batch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let counting = move |x: u32| -> Result<u32> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(x + 1000)
    };
    let mut queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(12),
        Arc::new(counting),
        config(4, 2, false),
    )
    .unwrap();
    let status = queue.status();

    let batch = queue.dequeue().await.unwrap();
    assert_eq!(batch.examples, vec![1000, 1001, 1002, 1003]);

    queue.shutdown().await;
    let produced = status.stats().batches_produced as usize;
    assert_eq!(calls.load(Ordering::SeqCst), produced * 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_closes_queue() {
    let queue = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Val,
        numbered(10),
        Arc::new(Identity),
        config(2, 2, true),
    )
    .unwrap();
    let status = queue.status();

    drop(queue);

    assert!(status.is_closed());
    assert!(wait_until(|| !status.is_producer_running()).await);
}

#[tokio::test]
async fn test_zero_capacity_rejected() {
    let result = PrefetchQueue::spawn(
        &Handle::current(),
        Split::Train,
        numbered(10),
        Arc::new(Identity),
        config(2, 0, true),
    );
    assert!(matches!(result, Err(TrainerError::InvalidConfig { .. })));
}
