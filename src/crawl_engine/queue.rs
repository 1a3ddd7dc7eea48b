//! Bounded URL queue with a shared processed-set
//!
//! Producers hold cloneable [`UrlQueue`] handles and block when the queue is
//! full. The single [`UrlReceiver`] marks URLs processed as it dequeues
//! them; that insert is the atomic add-if-absent every producer consults.

use dashmap::DashSet;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{CrawlError, CrawlResult};

/// URLs that have been handed to the crawler at least once.
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    inner: Arc<DashSet<String>>,
}

impl ProcessedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the URL was not yet present.
    pub fn insert(&self, url: &str) -> bool {
        self.inner.insert(url.to_string())
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.inner.contains(url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Create a queue with room for `capacity` pending URLs.
#[must_use]
pub fn url_queue(capacity: usize) -> (UrlQueue, UrlReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let processed = ProcessedSet::new();
    (
        UrlQueue {
            tx,
            processed: processed.clone(),
        },
        UrlReceiver { rx, processed },
    )
}

/// Producer handle.
#[derive(Debug, Clone)]
pub struct UrlQueue {
    tx: mpsc::Sender<String>,
    processed: ProcessedSet,
}

impl UrlQueue {
    /// Enqueue `url` unless it was already processed. Waits while full.
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Cancelled` when the consumer is gone.
    pub async fn enqueue(&self, url: impl Into<String>) -> CrawlResult<bool> {
        let url = url.into();
        if self.processed.contains(&url) {
            debug!("Skipping already processed URL {url}");
            return Ok(false);
        }
        self.tx.send(url).await.map_err(|_| CrawlError::Cancelled)?;
        Ok(true)
    }

    #[must_use]
    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }
}

/// One drained batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    pub urls: Vec<String>,
    /// Every producer is gone and nothing is left to drain
    pub closed: bool,
}

/// Consumer handle owned by the orchestrator.
#[derive(Debug)]
pub struct UrlReceiver {
    rx: mpsc::Receiver<String>,
    processed: ProcessedSet,
}

impl UrlReceiver {
    /// Drain up to `max` URLs, waiting at most `wait` for each one.
    ///
    /// Stops early once the queue runs dry. URLs already in the processed
    /// set are dropped here so no URL is fetched twice.
    pub async fn next_batch(&mut self, max: usize, wait: Duration) -> Batch {
        let mut batch = Batch::default();

        while batch.urls.len() < max {
            // Once something is in hand, do not wait on an empty queue
            if !batch.urls.is_empty() && self.rx.is_empty() {
                break;
            }
            match tokio::time::timeout(wait, self.rx.recv()).await {
                Ok(Some(url)) => {
                    if self.processed.insert(&url) {
                        batch.urls.push(url);
                    } else {
                        debug!("Dropping duplicate URL {url}");
                    }
                }
                Ok(None) => {
                    batch.closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        batch
    }

    #[must_use]
    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// True once every producer is dropped and the queue is drained.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_batch_dedupes_and_stops_when_dry() {
        let (queue, mut receiver) = url_queue(10);
        queue.enqueue("http://a").await.expect("enqueue");
        queue.enqueue("http://b").await.expect("enqueue");
        queue.enqueue("http://a").await.expect("enqueue");

        let batch = receiver.next_batch(10, Duration::from_secs(1)).await;
        assert_eq!(batch.urls, vec!["http://a", "http://b"]);
        assert!(!batch.closed);

        // Producers skip what the consumer already took
        assert!(!queue.enqueue("http://b").await.expect("enqueue"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_queue_reports_closed() {
        let (queue, mut receiver) = url_queue(2);
        queue.enqueue("http://a").await.expect("enqueue");
        drop(queue);

        let first = receiver.next_batch(5, Duration::from_secs(1)).await;
        assert_eq!(first.urls, vec!["http://a"]);
        let second = receiver.next_batch(5, Duration::from_secs(1)).await;
        assert!(second.urls.is_empty());
        assert!(second.closed);
        assert!(receiver.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_open_queue_times_out() {
        let (_queue, mut receiver) = url_queue(2);
        let batch = receiver.next_batch(5, Duration::from_secs(1)).await;
        assert!(batch.urls.is_empty());
        assert!(!batch.closed);
    }
}
