//! Fluent builder for `CrawlerConfig`
//!
//! Every field has a default, so unlike a typestate builder there is no
//! required step; `build()` runs the same validation as file loading.

use super::types::{
    AdaptiveSettings, AnalyzerSettings, CrawlerConfig, FingerprintSettings, RetrySettings,
};
use crate::error::CrawlResult;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfig {
    #[must_use]
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::default()
    }
}

impl CrawlerConfigBuilder {
    #[must_use]
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.config.queue_size = queue_size;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Minimum spacing between throttle grants, in seconds
    #[must_use]
    pub fn min_rate(mut self, secs: f64) -> Self {
        self.config.browser_service.throttle.min_rate = secs;
        self
    }

    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.config.browser_service.throttle.max_concurrent = max_concurrent;
        self
    }

    #[must_use]
    pub fn fingerprint(mut self, fingerprint: FingerprintSettings) -> Self {
        self.config.browser_service.fingerprint = fingerprint;
        self
    }

    #[must_use]
    pub fn adaptive(mut self, adaptive: AdaptiveSettings) -> Self {
        self.config.adaptive_manager = adaptive;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.browser.headless = headless;
        self
    }

    #[must_use]
    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.browser.navigation_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn simulate_behavior(mut self, simulate: bool) -> Self {
        self.config.browser.simulate_behavior = simulate;
        self
    }

    #[must_use]
    pub fn session_timeout_secs(mut self, secs: u64) -> Self {
        self.config.session.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn output_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.config.data_saver.base_filename = base.into();
        self
    }

    #[must_use]
    pub fn save_batch_size(mut self, batch_size: usize) -> Self {
        self.config.data_saver.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn analyzer(mut self, analyzer: AnalyzerSettings) -> Self {
        self.config.analyzer = analyzer;
        self
    }

    #[must_use]
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.collector.input_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn task_timeout_secs(mut self, secs: u64) -> Self {
        self.config.task_timeout_secs = Some(secs);
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Config` if validation fails.
    pub fn build(self) -> CrawlResult<CrawlerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
