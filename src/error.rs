//! Error types for crawl operations
//!
//! Every failure the crawler can observe is expressed as a `CrawlError`.
//! Fetch-level failures never escape the request manager; everything else is
//! caught at the per-URL task boundary and turned into a failed outcome.

/// Error types for crawl operations
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The browser engine or one of its sessions misbehaved
    #[error("Browser error: {0}")]
    Browser(String),

    /// A single navigation attempt failed
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// An operation exceeded its deadline
    #[error("{operation} timeout after {secs} seconds")]
    Timeout { operation: String, secs: u64 },

    /// Every fetch attempt for a URL was exhausted without usable content
    #[error("No usable content for {url} after {attempts} attempts")]
    ContentUnavailable { url: String, attempts: u32 },

    /// Article extraction produced nothing usable
    #[error("Extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    /// Content analysis backend failure
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// A countermeasure plugin failed
    #[error("Plugin {plugin} failed: {reason}")]
    Plugin { plugin: String, reason: String },

    /// Outcome records could not be persisted
    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Shutdown was requested while the operation was in flight
    #[error("Crawl cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for CrawlError {
    fn from(err: anyhow::Error) -> Self {
        Self::Browser(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_conversion_keeps_context_chain() {
        let err = anyhow::anyhow!("socket closed").context("Failed to launch browser");
        let crawl_err: CrawlError = err.into();
        let message = crawl_err.to_string();
        assert!(message.contains("Failed to launch browser"));
        assert!(message.contains("socket closed"));
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = CrawlError::Timeout {
            operation: "Page navigation".to_string(),
            secs: 60,
        };
        assert_eq!(err.to_string(), "Page navigation timeout after 60 seconds");
    }
}
