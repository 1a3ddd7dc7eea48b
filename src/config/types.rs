//! Core configuration types for news crawling
//!
//! `CrawlerConfig` groups the nested option sections the crawler consumes.
//! Every field is defaulted so a partial JSON file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{
    DEFAULT_ADJUST_THRESHOLD_FAST_SECS, DEFAULT_ADJUST_THRESHOLD_SLOW_SECS,
    DEFAULT_ANALYZER_TIMEOUT_SECS, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MAX_DELAY_SECS, DEFAULT_MAX_KEYWORDS, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY_SECS,
    DEFAULT_MIN_RATE_SECS, DEFAULT_OLLAMA_MODEL, DEFAULT_OUTPUT_BASENAME, DEFAULT_QUEUE_SIZE,
    DEFAULT_RANDOM_JITTER_SECS, DEFAULT_RETRY_BACKOFF_FACTOR, DEFAULT_RETRY_BASE_DELAY_SECS,
    DEFAULT_RETRY_MAX_DELAY_SECS, DEFAULT_SAVE_BATCH_SIZE, DEFAULT_SCREEN_HEIGHT,
    DEFAULT_SCREEN_WIDTH, DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_SUMMARY_LENGTH,
    NAVIGATION_TIMEOUT_SECS,
};

/// Main configuration struct for news crawling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Capacity of the bounded URL queue
    pub(crate) queue_size: usize,
    /// URLs drained per outer loop iteration
    pub(crate) batch_size: usize,
    pub(crate) browser_service: BrowserServiceSettings,
    pub(crate) adaptive_manager: AdaptiveSettings,
    pub(crate) retry: RetrySettings,
    pub(crate) browser: BrowserSettings,
    pub(crate) session: SessionSettings,
    pub(crate) data_saver: DataSaverSettings,
    pub(crate) analyzer: AnalyzerSettings,
    pub(crate) collector: CollectorSettings,
    /// Optional deadline for a whole per-URL task. Expiry takes the same
    /// cleanup path as success or failure.
    pub(crate) task_timeout_secs: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            browser_service: BrowserServiceSettings::default(),
            adaptive_manager: AdaptiveSettings::default(),
            retry: RetrySettings::default(),
            browser: BrowserSettings::default(),
            session: SessionSettings::default(),
            data_saver: DataSaverSettings::default(),
            analyzer: AnalyzerSettings::default(),
            collector: CollectorSettings::default(),
            task_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserServiceSettings {
    pub throttle: ThrottleSettings,
    pub fingerprint: FingerprintSettings,
}

/// Pacing gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    /// Minimum spacing between grants, in seconds
    pub min_rate: f64,
    /// Maximum requests in flight
    pub max_concurrent: usize,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            min_rate: DEFAULT_MIN_RATE_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Browser family a fingerprint impersonates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" | "safari" => Ok(Self::Webkit),
            other => Err(format!("unknown browser type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Identity settings consumed by the fingerprint manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintSettings {
    pub browser_type: BrowserType,
    /// Fixed user agent. When unset a user agent is drawn from the pool for
    /// `browser_type`.
    pub user_agent: Option<String>,
    /// Randomize user agent and screen size on every generation
    pub randomize: bool,
    pub screen_width: u32,
    pub screen_height: u32,
    pub locale: String,
    pub timezone_id: String,
    pub device_scale_factor: f64,
    pub geolocation: Geolocation,
}

impl Default for FingerprintSettings {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::Chromium,
            user_agent: None,
            randomize: false,
            screen_width: DEFAULT_SCREEN_WIDTH,
            screen_height: DEFAULT_SCREEN_HEIGHT,
            locale: "en-US".to_string(),
            timezone_id: "UTC".to_string(),
            device_scale_factor: 1.0,
            geolocation: Geolocation::default(),
        }
    }
}

/// Feedback-to-pacing loop settings, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSettings {
    pub min_delay: f64,
    pub max_delay: f64,
    pub adjust_threshold_slow: f64,
    pub adjust_threshold_fast: f64,
    pub random_jitter: f64,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            min_delay: DEFAULT_MIN_DELAY_SECS,
            max_delay: DEFAULT_MAX_DELAY_SECS,
            adjust_threshold_slow: DEFAULT_ADJUST_THRESHOLD_SLOW_SECS,
            adjust_threshold_fast: DEFAULT_ADJUST_THRESHOLD_FAST_SECS,
            random_jitter: DEFAULT_RANDOM_JITTER_SECS,
        }
    }
}

/// Fetch retry policy, delays in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: f64,
    pub max_delay: f64,
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY_SECS,
            max_delay: DEFAULT_RETRY_MAX_DELAY_SECS,
            backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub navigation_timeout_secs: u64,
    /// Run human-like scrolling and pauses after a successful fetch
    pub simulate_behavior: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: NAVIGATION_TIMEOUT_SECS,
            simulate_behavior: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSaverSettings {
    /// Output path prefix; files are written as `<base>_<timestamp>_<n>.jsonl`
    pub base_filename: PathBuf,
    pub batch_size: usize,
}

impl Default for DataSaverSettings {
    fn default() -> Self {
        Self {
            base_filename: PathBuf::from(DEFAULT_OUTPUT_BASENAME),
            batch_size: DEFAULT_SAVE_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Ollama generate endpoint. Analysis is skipped when unset.
    pub ollama_endpoint: Option<String>,
    pub model: String,
    /// JSON file with `en`/`zh` prompt templates
    pub prompt_file: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub max_keywords: usize,
    pub summary_length: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            ollama_endpoint: None,
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            prompt_file: None,
            request_timeout_secs: DEFAULT_ANALYZER_TIMEOUT_SECS,
            max_keywords: DEFAULT_MAX_KEYWORDS,
            summary_length: DEFAULT_SUMMARY_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Directory scanned for `.txt` and `.csv` URL seed files
    pub input_dir: Option<PathBuf>,
}
