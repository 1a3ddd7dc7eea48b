//! Timeout utilities for page operations
//!
//! Provides async timeout wrappers to prevent indefinite hangs during
//! page navigation and other browser operations.

use std::future::Future;
use std::time::Duration;

use crate::error::{CrawlError, CrawlResult};

/// Wrap an async page operation with an explicit timeout.
///
/// # Arguments
/// * `operation` - The async Future to execute with a timeout
/// * `timeout` - Upper bound for the operation
/// * `operation_name` - Human-readable name for error messages
///
/// # Returns
/// * `Ok(T)` - Operation completed successfully
/// * `Err` - Either the operation failed or `CrawlError::Timeout`
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> CrawlResult<T>
where
    F: Future<Output = CrawlResult<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(CrawlError::Timeout {
            operation: operation_name.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out() {
        let result: CrawlResult<()> = with_page_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(())
            },
            Duration::from_secs(60),
            "Page navigation",
        )
        .await;
        assert!(matches!(result, Err(CrawlError::Timeout { secs: 60, .. })));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: CrawlResult<()> = with_page_timeout(
            async { Err(CrawlError::Browser("tab crashed".into())) },
            Duration::from_secs(1),
            "Page navigation",
        )
        .await;
        assert!(matches!(result, Err(CrawlError::Browser(_))));
    }
}
