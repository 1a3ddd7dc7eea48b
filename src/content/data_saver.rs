//! Outcome persistence
//!
//! Records are buffered and written in batches, one JSON object per line,
//! to `<base>_<YYYYmmdd_HHMMSS>_<n>.jsonl`.

use chrono::Local;
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::DataSaverSettings;
use crate::crawl_engine::OutcomeRecord;
use crate::error::{CrawlError, CrawlResult};

/// Upper bound for serializing one batch off the runtime.
const BLOCKING_SERIALIZATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistence collaborator consumed by the orchestrator.
pub trait OutcomeSink: Send + Sync {
    fn add_record(&self, record: OutcomeRecord) -> BoxFuture<'_, CrawlResult<()>>;

    /// Persist anything still buffered.
    fn flush(&self) -> BoxFuture<'_, CrawlResult<()>>;
}

#[derive(Debug, Default)]
struct SaverState {
    records: Vec<OutcomeRecord>,
    file_counter: usize,
    written: Vec<PathBuf>,
}

/// A drained buffer on its way to disk.
struct PendingBatch {
    records: Vec<OutcomeRecord>,
    path: PathBuf,
}

fn encode_lines(records: &[OutcomeRecord]) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}

#[derive(Debug)]
pub struct JsonlDataSaver {
    base: PathBuf,
    batch_size: usize,
    state: Mutex<SaverState>,
}

impl JsonlDataSaver {
    #[must_use]
    pub fn new(settings: &DataSaverSettings) -> Self {
        Self {
            base: settings.base_filename.clone(),
            batch_size: settings.batch_size.max(1),
            state: Mutex::new(SaverState::default()),
        }
    }

    fn file_name(&self, counter: usize) -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut name = self.base.as_os_str().to_os_string();
        name.push(format!("_{timestamp}_{counter}.jsonl"));
        PathBuf::from(name)
    }

    /// Buffered records not yet on disk.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Files written so far, oldest first.
    #[must_use]
    pub fn written_files(&self) -> Vec<PathBuf> {
        self.state.lock().written.clone()
    }

    /// Take the whole buffer and reserve a file name for it.
    fn drain(&self, state: &mut SaverState) -> Option<PendingBatch> {
        if state.records.is_empty() {
            return None;
        }
        let path = self.file_name(state.file_counter);
        state.file_counter += 1;
        Some(PendingBatch {
            records: std::mem::take(&mut state.records),
            path,
        })
    }

    /// Write a drained batch to its file. The lock is never held here; on
    /// an I/O failure the records go back to the front of the buffer.
    async fn save(&self, batch: PendingBatch) -> CrawlResult<()> {
        let PendingBatch { records, path } = batch;

        let encoding = tokio::task::spawn_blocking(move || {
            let encoded = encode_lines(&records);
            (records, encoded)
        });
        let (records, encoded) = match timeout(BLOCKING_SERIALIZATION_TIMEOUT, encoding).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                return Err(CrawlError::Persistence(format!(
                    "record serialization task panicked: {e}"
                )));
            }
            Err(_) => {
                warn!("Record serialization timeout (timeout: {BLOCKING_SERIALIZATION_TIMEOUT:?})");
                return Err(CrawlError::Persistence(format!(
                    "record serialization timed out after {BLOCKING_SERIALIZATION_TIMEOUT:?}"
                )));
            }
        };
        let bytes = encoded?;

        let written = async {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await
        }
        .await;

        let mut state = self.state.lock();
        match written {
            Ok(()) => {
                info!("Saved {} records to {}", records.len(), path.display());
                state.written.push(path);
                Ok(())
            }
            Err(e) => {
                let mut restored = records;
                restored.append(&mut state.records);
                state.records = restored;
                Err(e.into())
            }
        }
    }
}

impl OutcomeSink for JsonlDataSaver {
    fn add_record(&self, record: OutcomeRecord) -> BoxFuture<'_, CrawlResult<()>> {
        Box::pin(async move {
            let batch = {
                let mut state = self.state.lock();
                state.records.push(record);
                if state.records.len() >= self.batch_size {
                    self.drain(&mut state)
                } else {
                    None
                }
            };
            match batch {
                Some(batch) => self
                    .save(batch)
                    .await
                    .inspect_err(|e| error!("Failed to save records: {e}")),
                None => Ok(()),
            }
        })
    }

    fn flush(&self) -> BoxFuture<'_, CrawlResult<()>> {
        Box::pin(async move {
            let batch = self.drain(&mut self.state.lock());
            match batch {
                Some(batch) => self
                    .save(batch)
                    .await
                    .inspect_err(|e| error!("Failed to flush records: {e}")),
                None => {
                    debug!("No records to save");
                    Ok(())
                }
            }
        })
    }
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<OutcomeRecord>>,
    flushes: Mutex<usize>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock().clone()
    }

    #[must_use]
    pub fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }
}

impl OutcomeSink for MemorySink {
    fn add_record(&self, record: OutcomeRecord) -> BoxFuture<'_, CrawlResult<()>> {
        self.records.lock().push(record);
        Box::pin(async { Ok(()) })
    }

    fn flush(&self) -> BoxFuture<'_, CrawlResult<()>> {
        *self.flushes.lock() += 1;
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_batches_and_flushes_remainder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = DataSaverSettings {
            base_filename: dir.path().join("out").join("articles"),
            batch_size: 2,
        };
        let saver = JsonlDataSaver::new(&settings);

        for i in 0..3 {
            saver
                .add_record(OutcomeRecord::failed(format!("https://a.example/{i}")))
                .await
                .expect("add");
        }
        assert_eq!(saver.written_files().len(), 1);
        assert_eq!(saver.pending(), 1);

        saver.flush().await.expect("flush");
        let files = saver.written_files();
        assert_eq!(files.len(), 2);
        assert_eq!(saver.pending(), 0);

        let first = std::fs::read_to_string(&files[0]).expect("read");
        let lines: Vec<_> = first.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: OutcomeRecord = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(parsed.url, "https://a.example/0");
        assert!(files[1].to_string_lossy().ends_with("_1.jsonl"));
    }

    #[tokio::test]
    async fn test_nothing_happens_until_polled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let saver = JsonlDataSaver::new(&DataSaverSettings {
            base_filename: dir.path().join("articles"),
            batch_size: 1,
        });

        let pending = saver.add_record(OutcomeRecord::failed("https://a.example/0"));
        assert_eq!(saver.pending(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 0);

        pending.await.expect("add");
        assert_eq!(saver.written_files().len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_records_buffered() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A regular file where the output directory should be
        let blocker = dir.path().join("out");
        std::fs::write(&blocker, "").expect("write");
        let saver = JsonlDataSaver::new(&DataSaverSettings {
            base_filename: blocker.join("articles"),
            batch_size: 10,
        });

        saver
            .add_record(OutcomeRecord::failed("https://a.example/0"))
            .await
            .expect("add");
        assert!(saver.flush().await.is_err());
        assert_eq!(saver.pending(), 1);
        assert!(saver.written_files().is_empty());
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = DataSaverSettings {
            base_filename: dir.path().join("articles"),
            batch_size: 10,
        };
        let saver = JsonlDataSaver::new(&settings);
        saver.flush().await.expect("flush");
        assert!(saver.written_files().is_empty());
    }
}
