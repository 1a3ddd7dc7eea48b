//! Shared configuration constants for the news crawler
//!
//! Default values and user-agent pools used throughout the crate so the
//! configuration layer, the fingerprint manager and the orchestrator agree
//! on the same numbers.

/// Default bound on the URL queue.
///
/// Producers block once this many URLs are waiting, which keeps memory flat
/// when a seed file holds far more URLs than the crawler can process.
pub const DEFAULT_QUEUE_SIZE: usize = 10;

/// Default number of URLs drained from the queue per outer loop iteration.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default minimum spacing between throttle grants, in seconds.
pub const DEFAULT_MIN_RATE_SECS: f64 = 1.0;

/// Default number of requests allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Adaptive delay defaults (seconds).
pub const DEFAULT_MIN_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_MAX_DELAY_SECS: f64 = 5.0;
pub const DEFAULT_ADJUST_THRESHOLD_SLOW_SECS: f64 = 2.0;
pub const DEFAULT_ADJUST_THRESHOLD_FAST_SECS: f64 = 0.5;
pub const DEFAULT_RANDOM_JITTER_SECS: f64 = 0.2;

/// Retry defaults. Backoff is `base * factor^(attempt - 1)` capped at `max`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_RETRY_MAX_DELAY_SECS: f64 = 10.0;
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;

/// Upper bound of the uniform jitter added on top of each retry backoff.
pub const RETRY_JITTER_MAX_SECS: f64 = 0.5;

/// Hard timeout for a single page navigation.
pub const NAVIGATION_TIMEOUT_SECS: u64 = 60;

/// Sessions idle longer than this are considered expired.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 3600;

/// How long the orchestrator waits for a URL before closing a partial batch.
pub const DEQUEUE_WAIT_MS: u64 = 1000;

/// Pause between batches, and while the queue is idle.
pub const BATCH_PAUSE_MS: u64 = 100;
pub const IDLE_PAUSE_MS: u64 = 1000;

/// Delay countermeasure plugins suggest when a challenge page is detected.
pub const ANTI_BOT_SUGGESTED_DELAY_SECS: f64 = 2.0;

/// Content shorter than this is treated as a blocked or stub page.
pub const MIN_CONTENT_LENGTH: usize = 100;

/// Paragraph text shorter than this is not considered article body.
pub const MIN_PARAGRAPH_CHARS: usize = 50;

/// Randomized viewport ranges used by fingerprint generation and rotation.
pub const SCREEN_WIDTH_RANGE: (u32, u32) = (1024, 1920);
pub const SCREEN_HEIGHT_RANGE: (u32, u32) = (768, 1080);

/// Default fingerprint viewport.
pub const DEFAULT_SCREEN_WIDTH: u32 = 1280;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 720;

/// Default data saver settings.
pub const DEFAULT_OUTPUT_BASENAME: &str = "articles";
pub const DEFAULT_SAVE_BATCH_SIZE: usize = 100;

/// Analyzer defaults.
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:7b";
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_KEYWORDS: usize = 5;
pub const DEFAULT_SUMMARY_LENGTH: usize = 50;

/// Chrome user agent used when no fingerprint has been generated yet.
///
/// Chrome releases new stable versions roughly every four weeks; the pools
/// below should be refreshed on the same cadence.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

pub const CHROME_USER_AGENTS: &[&str] = &[
    CHROME_USER_AGENT,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.204 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.265 Safari/537.36",
];

pub const FIREFOX_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

pub const SAFARI_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (iPad; CPU OS 17_7 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
];
