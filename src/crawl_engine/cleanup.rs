//! Per-URL environment cleanup
//!
//! Clears the cookies and web storage a session accumulated so the next
//! URL starts from a clean slate, and reports what could not be cleaned.

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::crawl_types::CrawlContext;
use crate::browser::BrowsingSession;

/// Result of cleanup operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupResult {
    /// All cleanup operations succeeded
    Success,
    /// Some cleanup operations failed, with error details
    PartialFailure(Vec<String>),
}

impl CleanupResult {
    #[must_use]
    pub fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            Self::Success
        } else {
            Self::PartialFailure(errors)
        }
    }
}

#[derive(Debug, Default)]
pub struct EnvironmentCleaner {
    last_cleaned: Mutex<Option<DateTime<Local>>>,
    cleaned_sessions: AtomicU64,
}

impl EnvironmentCleaner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort wipe of cookies plus local and session storage.
    ///
    /// Failures are logged and reported, never raised: cleanup must not
    /// turn a finished URL into a failed one.
    pub async fn clean_session<S: BrowsingSession>(
        &self,
        ctx: &CrawlContext,
        session: &S,
    ) -> CleanupResult {
        let mut errors = Vec::new();

        debug!(target: "news_crawler::cleanup", "Clearing browser state for session {}", ctx.session_id);
        if let Err(e) = session.clear_storage().await {
            warn!(target: "news_crawler::cleanup", "Failed to clear storage for {}: {e}", ctx.url);
            errors.push(format!("Storage clear failed: {e}"));
        }

        *self.last_cleaned.lock() = Some(Local::now());
        self.cleaned_sessions.fetch_add(1, Ordering::Relaxed);

        CleanupResult::from_errors(errors)
    }

    /// Forget cleanup history.
    pub fn reset_environment(&self) {
        *self.last_cleaned.lock() = None;
        self.cleaned_sessions.store(0, Ordering::Relaxed);
        info!(target: "news_crawler::cleanup", "Environment state reset");
    }

    #[must_use]
    pub fn last_cleaned(&self) -> Option<DateTime<Local>> {
        *self.last_cleaned.lock()
    }

    #[must_use]
    pub fn cleaned_sessions(&self) -> u64 {
        self.cleaned_sessions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errors() {
        assert_eq!(CleanupResult::from_errors(Vec::new()), CleanupResult::Success);
        assert!(matches!(
            CleanupResult::from_errors(vec!["x".into()]),
            CleanupResult::PartialFailure(errors) if errors.len() == 1
        ));
    }

    #[test]
    fn test_reset_clears_history() {
        let cleaner = EnvironmentCleaner::new();
        *cleaner.last_cleaned.lock() = Some(Local::now());
        cleaner.cleaned_sessions.store(3, Ordering::Relaxed);
        cleaner.reset_environment();
        assert!(cleaner.last_cleaned().is_none());
        assert_eq!(cleaner.cleaned_sessions(), 0);
    }
}
