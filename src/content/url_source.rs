//! Seed the URL queue from files on disk
//!
//! `.txt` files hold one URL per line; `.csv` files must have a `url` column.

use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::crawl_engine::UrlQueue;
use crate::error::{CrawlError, CrawlResult};

#[derive(Debug, Clone)]
pub struct FileUrlSource {
    input_dir: PathBuf,
}

impl FileUrlSource {
    #[must_use]
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
        }
    }

    #[must_use]
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Read every URL from one seed file.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files and on CSV files without a `url` column.
    pub async fn read_file(path: &Path) -> CrawlResult<Vec<String>> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let urls = match extension.as_deref() {
            Some("txt") => tokio::fs::read_to_string(path)
                .await?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Some("csv") => {
                let path = path.to_path_buf();
                tokio::task::spawn_blocking(move || Self::read_csv(&path))
                    .await
                    .map_err(|e| CrawlError::Config(format!("CSV reader task failed: {e}")))??
            }
            _ => Vec::new(),
        };
        Ok(urls)
    }

    fn read_csv(path: &Path) -> CrawlResult<Vec<String>> {
        let csv_error = |e: csv::Error| CrawlError::Config(format!("{}: {e}", path.display()));
        let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
        let column = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .position(|header| header.trim() == "url")
            .ok_or_else(|| CrawlError::Config(format!("{} has no 'url' column", path.display())))?;

        let mut urls = Vec::new();
        for row in reader.records() {
            let row = row.map_err(csv_error)?;
            if let Some(url) = row.get(column).map(str::trim).filter(|u| !u.is_empty()) {
                urls.push(url.to_string());
            }
        }
        Ok(urls)
    }

    /// Seed files in the input directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be listed.
    pub async fn seed_files(&self) -> CrawlResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.input_dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_seed = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("csv"));
            if is_seed && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Enqueue every URL found in the input directory.
    ///
    /// Unreadable files are logged and skipped. Returns how many URLs were
    /// accepted by the queue.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be listed or the queue is closed.
    pub async fn seed(&self, queue: &UrlQueue) -> CrawlResult<usize> {
        let mut accepted = 0;
        for file in self.seed_files().await? {
            let urls = match Self::read_file(&file).await {
                Ok(urls) => urls,
                Err(e) => {
                    warn!("Skipping seed file {}: {e}", file.display());
                    continue;
                }
            };
            info!("Loaded {} URLs from {}", urls.len(), file.display());
            for url in urls {
                if queue.enqueue(url).await? {
                    accepted += 1;
                }
            }
        }
        Ok(accepted)
    }
}
