//! Accessors, loading and validation for `CrawlerConfig`

use std::path::Path;
use std::time::Duration;

use super::types::{
    AdaptiveSettings, AnalyzerSettings, BrowserSettings, CollectorSettings, CrawlerConfig,
    DataSaverSettings, FingerprintSettings, RetrySettings, SessionSettings, ThrottleSettings,
};
use crate::error::{CrawlError, CrawlResult};
use crate::utils::secs_to_duration;

impl CrawlerConfig {
    /// Load a configuration from a JSON file and validate it.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Config` when the file cannot be read, is not
    /// valid JSON, or fails [`CrawlerConfig::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> CrawlResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CrawlError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            CrawlError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the control loops cannot honor.
    ///
    /// # Errors
    ///
    /// Returns `CrawlError::Config` naming the first offending field.
    pub fn validate(&self) -> CrawlResult<()> {
        fn non_negative(name: &str, value: f64) -> CrawlResult<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(CrawlError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )))
            }
        }

        if self.queue_size == 0 {
            return Err(CrawlError::Config("queue_size must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(CrawlError::Config("batch_size must be at least 1".into()));
        }

        let throttle = &self.browser_service.throttle;
        non_negative("throttle.min_rate", throttle.min_rate)?;
        if throttle.max_concurrent == 0 {
            return Err(CrawlError::Config(
                "throttle.max_concurrent must be at least 1".into(),
            ));
        }

        let fingerprint = &self.browser_service.fingerprint;
        if fingerprint.screen_width == 0 || fingerprint.screen_height == 0 {
            return Err(CrawlError::Config(
                "fingerprint screen size must be non-zero".into(),
            ));
        }
        if !(fingerprint.device_scale_factor.is_finite() && fingerprint.device_scale_factor > 0.0)
        {
            return Err(CrawlError::Config(
                "fingerprint.device_scale_factor must be positive".into(),
            ));
        }

        let adaptive = &self.adaptive_manager;
        non_negative("adaptive_manager.min_delay", adaptive.min_delay)?;
        non_negative("adaptive_manager.max_delay", adaptive.max_delay)?;
        non_negative("adaptive_manager.adjust_threshold_slow", adaptive.adjust_threshold_slow)?;
        non_negative("adaptive_manager.adjust_threshold_fast", adaptive.adjust_threshold_fast)?;
        non_negative("adaptive_manager.random_jitter", adaptive.random_jitter)?;
        if adaptive.min_delay > adaptive.max_delay {
            return Err(CrawlError::Config(format!(
                "adaptive_manager.min_delay ({}) exceeds max_delay ({})",
                adaptive.min_delay, adaptive.max_delay
            )));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(CrawlError::Config("retry.max_attempts must be at least 1".into()));
        }
        non_negative("retry.base_delay", retry.base_delay)?;
        non_negative("retry.max_delay", retry.max_delay)?;
        if !(retry.backoff_factor.is_finite() && retry.backoff_factor >= 1.0) {
            return Err(CrawlError::Config(
                "retry.backoff_factor must be at least 1.0".into(),
            ));
        }

        if self.data_saver.batch_size == 0 {
            return Err(CrawlError::Config("data_saver.batch_size must be at least 1".into()));
        }

        Ok(())
    }

    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn throttle(&self) -> &ThrottleSettings {
        &self.browser_service.throttle
    }

    #[must_use]
    pub fn min_rate(&self) -> Duration {
        secs_to_duration(self.browser_service.throttle.min_rate)
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.browser_service.throttle.max_concurrent.max(1)
    }

    #[must_use]
    pub fn fingerprint(&self) -> &FingerprintSettings {
        &self.browser_service.fingerprint
    }

    #[must_use]
    pub fn adaptive(&self) -> &AdaptiveSettings {
        &self.adaptive_manager
    }

    #[must_use]
    pub fn retry(&self) -> &RetrySettings {
        &self.retry
    }

    #[must_use]
    pub fn browser(&self) -> &BrowserSettings {
        &self.browser
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.browser.headless
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.navigation_timeout_secs)
    }

    #[must_use]
    pub fn simulate_behavior(&self) -> bool {
        self.browser.simulate_behavior
    }

    #[must_use]
    pub fn session(&self) -> &SessionSettings {
        &self.session
    }

    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session.timeout_secs)
    }

    #[must_use]
    pub fn data_saver(&self) -> &DataSaverSettings {
        &self.data_saver
    }

    #[must_use]
    pub fn analyzer(&self) -> &AnalyzerSettings {
        &self.analyzer
    }

    #[must_use]
    pub fn collector(&self) -> &CollectorSettings {
        &self.collector
    }

    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Mutable access used by command-line overrides.
    pub fn fingerprint_mut(&mut self) -> &mut FingerprintSettings {
        &mut self.browser_service.fingerprint
    }

    pub fn throttle_mut(&mut self) -> &mut ThrottleSettings {
        &mut self.browser_service.throttle
    }

    pub fn adaptive_mut(&mut self) -> &mut AdaptiveSettings {
        &mut self.adaptive_manager
    }

    pub fn analyzer_mut(&mut self) -> &mut AnalyzerSettings {
        &mut self.analyzer
    }

    pub fn data_saver_mut(&mut self) -> &mut DataSaverSettings {
        &mut self.data_saver
    }

    pub fn collector_mut(&mut self) -> &mut CollectorSettings {
        &mut self.collector
    }

    pub fn browser_mut(&mut self) -> &mut BrowserSettings {
        &mut self.browser
    }

    pub fn set_queue_size(&mut self, queue_size: usize) {
        self.queue_size = queue_size;
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
    }

    pub fn set_task_timeout_secs(&mut self, secs: Option<u64>) {
        self.task_timeout_secs = secs;
    }
}
