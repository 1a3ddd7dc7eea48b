pub mod browser;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod content;
pub mod crawl_engine;
pub mod error;
pub mod kromekover;
pub mod utils;

pub use browser::{
    BrowserEngine, BrowsingSession, ChromiumEngine, ChromiumLauncher, ChromiumSession,
    EngineLauncher, PageResponse,
};
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use config::CrawlerConfig;
pub use content::{
    ArticleExtractor, ArticleParser, ContentAnalyzer, FileUrlSource, JsonlDataSaver, MemorySink,
    NoopAnalyzer, OllamaAnalyzer, OutcomeSink,
};
pub use crawl_engine::{
    Collaborators, CrawlContext, CrawlStatsSnapshot, NewsCrawler, OutcomeRecord, OutcomeStatus,
    UrlQueue, UrlReceiver, url_queue,
};
pub use error::{CrawlError, CrawlResult};
