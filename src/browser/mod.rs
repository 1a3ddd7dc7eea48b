//! Abstract browsing capability
//!
//! The crawl engine never talks to a rendering engine directly. It launches
//! an engine per batch through an [`EngineLauncher`], opens one isolated
//! [`BrowsingSession`] per URL, and drives it through this small surface.
//! [`chromium`] provides the Chrome DevTools implementation.

pub mod chromium;

use std::future::Future;

use crate::crawl_engine::crawl_types::Fingerprint;
use crate::error::CrawlResult;

pub use chromium::{ChromiumEngine, ChromiumLauncher, ChromiumSession};

/// Result of one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// HTTP status of the main document, 0 when unknown
    pub status: u16,
    /// Rendered document HTML
    pub content: String,
}

/// Starts browser engines. One engine is launched per outer crawl loop
/// iteration and shared read-mostly by that batch's tasks.
pub trait EngineLauncher: Send + Sync + 'static {
    type Engine: BrowserEngine;

    fn launch(&self) -> impl Future<Output = CrawlResult<Self::Engine>> + Send;
}

/// A running browser that hands out isolated sessions.
pub trait BrowserEngine: Send + Sync + 'static {
    type Session: BrowsingSession;

    /// Open an isolated context and page configured with `fingerprint`:
    /// user agent, viewport, device scale, locale, timezone and geolocation.
    fn open_session(
        &self,
        fingerprint: &Fingerprint,
    ) -> impl Future<Output = CrawlResult<Self::Session>> + Send;

    fn shutdown(self) -> impl Future<Output = CrawlResult<()>> + Send;
}

/// One isolated context plus page. Sessions never share cookies or storage.
pub trait BrowsingSession: Send + Sync + 'static {
    fn navigate(&self, url: &str) -> impl Future<Output = CrawlResult<PageResponse>> + Send;

    /// Inject anti-detection scripts consistent with `fingerprint`.
    fn apply_stealth(
        &self,
        fingerprint: &Fingerprint,
    ) -> impl Future<Output = CrawlResult<()>> + Send;

    fn evaluate(
        &self,
        script: &str,
    ) -> impl Future<Output = CrawlResult<serde_json::Value>> + Send;

    /// Clear cookies plus local and session storage.
    fn clear_storage(&self) -> impl Future<Output = CrawlResult<()>> + Send;

    /// Close the page and dispose of its context.
    fn close(self) -> impl Future<Output = CrawlResult<()>> + Send;
}
