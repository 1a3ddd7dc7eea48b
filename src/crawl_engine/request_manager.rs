//! Fetch-with-retry
//!
//! Each call runs `ATTEMPT -> {SUCCESS, RETRY, EXHAUSTED}`: every attempt is
//! bounded by the navigation timeout, its outcome replaces the context's
//! response snapshot, and retryable outcomes back off exponentially with
//! jitter until the context's attempt budget is spent.

use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::crawl_types::{CrawlContext, ResponseSnapshot};
use super::page_timeout::with_page_timeout;
use crate::browser::BrowsingSession;
use crate::config::RetrySettings;
use crate::utils::{RETRY_JITTER_MAX_SECS, contains_marker, secs_to_duration};

/// Content shorter than this is never a real page.
const MIN_RESPONSE_CHARS: usize = 50;

/// Exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: secs_to_duration(settings.base_delay),
            max_delay: secs_to_duration(settings.max_delay),
            backoff_factor: settings.backoff_factor,
        }
    }
}

impl RetryPolicy {
    /// `min(base * factor^(attempt - 1), max)` for a 1-indexed attempt.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            secs_to_duration(secs)
        } else {
            self.max_delay
        }
    }
}

/// Uniform jitter in `[0, 0.5s]` added on top of every backoff.
#[must_use]
pub fn retry_jitter() -> Duration {
    secs_to_duration(rand::rng().random_range(0.0..=RETRY_JITTER_MAX_SECS))
}

/// True when an attempt's outcome warrants another attempt.
#[must_use]
pub fn should_retry(response: &ResponseSnapshot) -> bool {
    matches!(response.status, 429 | 503 | 504)
        || response.status >= 400
        || response.content.chars().count() < MIN_RESPONSE_CHARS
        || contains_marker(&response.content, "captcha")
}

#[derive(Debug, Default)]
pub struct RetryStats {
    success: AtomicU64,
    failure: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStatsSnapshot {
    pub success: u64,
    pub failure: u64,
}

impl RetryStats {
    #[must_use]
    pub fn snapshot(&self) -> RetryStatsSnapshot {
        RetryStatsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct RequestManager {
    policy: RetryPolicy,
    navigation_timeout: Duration,
    stats: RetryStats,
}

impl RequestManager {
    #[must_use]
    pub fn new(policy: RetryPolicy, navigation_timeout: Duration) -> Self {
        Self {
            policy,
            navigation_timeout,
            stats: RetryStats::default(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn retry_stats(&self) -> RetryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Fetch `ctx.url`, retrying retryable outcomes until `ctx.max_attempts`
    /// attempts have been made.
    ///
    /// Returns the content on success and `None` once the budget is spent.
    /// Every attempt bumps `ctx.attempts` and replaces `ctx.response`.
    /// Navigation errors and timeouts count as retryable attempts.
    pub async fn send_request<S: BrowsingSession>(
        &self,
        session: &S,
        ctx: &mut CrawlContext,
    ) -> Option<String> {
        let max_attempts = ctx.max_attempts.max(1);
        ctx.attempts = 0;

        loop {
            let started = Instant::now();
            let outcome = with_page_timeout(
                session.navigate(&ctx.url),
                self.navigation_timeout,
                "Page navigation",
            )
            .await;
            ctx.attempts += 1;
            let load_time = started.elapsed();

            let snapshot = match outcome {
                Ok(page) => ResponseSnapshot::new(page.content, page.status, load_time),
                Err(e) => {
                    warn!("Attempt {}/{max_attempts} for {} failed: {e}", ctx.attempts, ctx.url);
                    ResponseSnapshot::failed(load_time)
                }
            };
            let retry = should_retry(&snapshot);
            let status = snapshot.status;
            ctx.response = Some(snapshot);

            if !retry {
                self.stats.success.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Fetched {} (status {status}) in {:.2}s on attempt {}",
                    ctx.url,
                    load_time.as_secs_f64(),
                    ctx.attempts
                );
                return ctx.response.as_ref().map(|r| r.content.clone());
            }

            if ctx.attempts >= max_attempts {
                self.stats.failure.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Giving up on {} after {} attempts (last status {status})",
                    ctx.url, ctx.attempts
                );
                return None;
            }

            let delay = self.policy.backoff_delay(ctx.attempts) + retry_jitter();
            debug!(
                "Retrying {} in {:.2}s (attempt {}/{max_attempts}, status {status})",
                ctx.url,
                delay.as_secs_f64(),
                ctx.attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}
