//! Crawl Engine Module
//!
//! The crawl core: the URL queue consumer, the per-URL pipeline, and the
//! pacing, retry and countermeasure machinery it drives.

// Sub-modules
pub mod adaptive;
pub mod behavior;
pub mod browser_service;
pub mod cleanup;
pub mod crawl_types;
pub mod fingerprint;
pub mod orchestrator;
pub mod page_timeout;
pub mod plugins;
pub mod queue;
pub mod request_manager;
pub mod session;
pub mod throttle;

// Re-exports for public API
pub use orchestrator::{Collaborators, CrawlStats, CrawlStatsSnapshot, NewsCrawler};

pub use adaptive::{AdaptiveManager, AdjustmentCounts, DelayAdjustment};
pub use behavior::BehaviorSimulator;
pub use browser_service::BrowserService;
pub use cleanup::{CleanupResult, EnvironmentCleaner};
pub use fingerprint::{FingerprintManager, user_agent_pool};
pub use page_timeout::with_page_timeout;
pub use plugins::{AntiBotPlugin, CountermeasurePlugin, PluginManager};
pub use queue::{Batch, ProcessedSet, UrlQueue, UrlReceiver, url_queue};
pub use request_manager::{
    RequestManager, RetryPolicy, RetryStats, RetryStatsSnapshot, retry_jitter, should_retry,
};
pub use session::{SessionManager, SessionRecord, SessionUpdate};
pub use throttle::{ThrottleManager, ThrottlePermit};

// Re-export crawl types
pub use crawl_types::{
    CrawlContext, Feedback, Fingerprint, OutcomeRecord, OutcomeStatus, PluginHints,
    ResponseSnapshot, Viewport,
};
