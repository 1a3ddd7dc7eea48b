// Admission control: throttle spacing and concurrency, queue backpressure
use news_crawler::crawl_engine::{ThrottleManager, url_queue};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquires_never_exceed_limit() {
    let throttle = Arc::new(ThrottleManager::new(Duration::from_millis(10), 2));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let throttle = Arc::clone(&throttle);
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let permit = throttle.acquire().await;
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(throttle.active_requests() <= 2);
            tokio::time::sleep(Duration::from_millis(100)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        }));
    }
    for handle in handles {
        handle.await.expect("task finished");
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(throttle.active_requests(), 0);
    assert_eq!(throttle.granted_total(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_grants_respect_rate() {
    let throttle = Arc::new(ThrottleManager::new(Duration::from_millis(500), 4));

    let first = throttle.acquire().await;
    let first_at = Instant::now();
    first.release();

    let second = throttle.acquire().await;
    let gap = first_at.elapsed();
    second.release();

    assert!(gap >= Duration::from_millis(500), "gap was {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn test_raised_rate_spaces_later_grants() {
    let throttle = Arc::new(ThrottleManager::new(Duration::from_millis(100), 1));
    throttle.set_rate(Duration::from_secs(2));
    // Never below the configured floor
    throttle.set_rate(Duration::from_millis(1));
    assert_eq!(throttle.current_rate(), Duration::from_millis(100));

    throttle.set_rate(Duration::from_secs(2));
    drop(throttle.acquire().await);
    let started = Instant::now();
    drop(throttle.acquire().await);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_releases_its_slot() {
    let throttle = Arc::new(ThrottleManager::new(Duration::from_secs(5), 1));
    drop(throttle.acquire().await);

    // This grant is reserved five seconds out; abandon it halfway
    let waiting = tokio::time::timeout(Duration::from_secs(1), throttle.acquire()).await;
    assert!(waiting.is_err());
    assert_eq!(throttle.active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_blocks_producer_until_dequeue() {
    let (queue, mut receiver) = url_queue(1);
    queue.enqueue("http://first").await.expect("enqueue");

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.enqueue("http://second").await })
    };

    // Still blocked while the only slot is taken
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!producer.is_finished());

    let batch = receiver.next_batch(1, Duration::from_secs(1)).await;
    assert_eq!(batch.urls, vec!["http://first"]);

    let accepted = producer.await.expect("join").expect("enqueue");
    assert!(accepted);
    let batch = receiver.next_batch(1, Duration::from_secs(1)).await;
    assert_eq!(batch.urls, vec!["http://second"]);
}

#[tokio::test(start_paused = true)]
async fn test_processed_urls_are_not_requeued() {
    let (queue, mut receiver) = url_queue(4);
    queue.enqueue("http://a").await.expect("enqueue");
    let batch = receiver.next_batch(4, Duration::from_secs(1)).await;
    assert_eq!(batch.urls.len(), 1);

    assert!(!queue.enqueue("http://a").await.expect("enqueue"));
    assert!(queue.processed().contains("http://a"));
    assert_eq!(receiver.processed().len(), 1);
}
