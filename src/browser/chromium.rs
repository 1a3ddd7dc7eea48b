//! Chrome DevTools implementation of the browsing capability
//!
//! One Chrome process per engine, one CDP browser context per session.
//! Contexts are the unit of isolation: cookies, storage and permissions
//! granted to one session are invisible to its siblings.

use chromiumoxide::cdp::browser_protocol::browser::{
    BrowserContextId, GrantPermissionsParams, PermissionType,
};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetLocaleOverrideParams,
    SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, Page};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserEngine, BrowsingSession, EngineLauncher, PageResponse};
use crate::browser_profile::{PROFILE_PREFIX, create_unique_profile_with_prefix, remove_profile_dir};
use crate::browser_setup::launch_browser;
use crate::crawl_engine::cleanup::CleanupResult;
use crate::crawl_engine::crawl_types::Fingerprint;
use crate::error::{CrawlError, CrawlResult};
use crate::utils::CHROME_USER_AGENT;

/// Main document status from the Navigation Timing API. Chrome reports 0
/// for documents that were not fetched over HTTP.
const NAVIGATION_STATUS_JS: &str =
    "(() => { const e = performance.getEntriesByType('navigation')[0]; return e ? (e.responseStatus || 0) : 0; })()";

const CLEAR_STORAGE_JS: &str =
    "(() => { try { localStorage.clear(); sessionStorage.clear(); } catch (e) {} return true; })()";

fn cdp_err(e: impl std::fmt::Display) -> CrawlError {
    CrawlError::Browser(e.to_string())
}

/// Launches a headless (or headed) Chrome per crawl batch.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

impl EngineLauncher for ChromiumLauncher {
    type Engine = ChromiumEngine;

    async fn launch(&self) -> CrawlResult<ChromiumEngine> {
        let profile = create_unique_profile_with_prefix(PROFILE_PREFIX)?;
        let (browser, handler) =
            launch_browser(self.headless, profile.path().to_path_buf(), CHROME_USER_AGENT).await?;
        // The engine owns the directory from here on
        let profile_dir = profile.into_path();
        info!("Launched browser engine with profile {}", profile_dir.display());
        Ok(ChromiumEngine {
            browser: Arc::new(browser),
            handler,
            profile_dir,
        })
    }
}

pub struct ChromiumEngine {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
}

async fn configure_page(
    browser: &Browser,
    page: &Page,
    context_id: &BrowserContextId,
    fingerprint: &Fingerprint,
) -> CrawlResult<()> {
    page.execute(
        SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(fingerprint.viewport.width))
            .height(i64::from(fingerprint.viewport.height))
            .device_scale_factor(fingerprint.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(CrawlError::Browser)?,
    )
    .await
    .map_err(cdp_err)?;

    page.execute(SetUserAgentOverrideParams {
        user_agent: fingerprint.user_agent.clone(),
        accept_language: Some(fingerprint.accept_language()),
        platform: Some(fingerprint.platform().to_string()),
        user_agent_metadata: None,
    })
    .await
    .map_err(cdp_err)?;

    let mut locale = SetLocaleOverrideParams::default();
    locale.locale = Some(fingerprint.locale.clone());
    if let Err(e) = page.execute(locale).await {
        warn!("Locale override rejected for {}: {e}", fingerprint.locale);
    }

    if let Err(e) = page
        .execute(SetTimezoneOverrideParams::new(fingerprint.timezone_id.clone()))
        .await
    {
        warn!("Timezone override rejected for {}: {e}", fingerprint.timezone_id);
    }

    let mut geolocation = SetGeolocationOverrideParams::default();
    geolocation.latitude = Some(fingerprint.geolocation.latitude);
    geolocation.longitude = Some(fingerprint.geolocation.longitude);
    geolocation.accuracy = Some(100.0);
    page.execute(geolocation).await.map_err(cdp_err)?;

    let mut grant = GrantPermissionsParams::new(vec![PermissionType::Geolocation]);
    grant.browser_context_id = Some(context_id.clone());
    browser.execute(grant).await.map_err(cdp_err)?;

    Ok(())
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        warn!("Failed to dispose browser context: {e}");
    }
}

/// Create a context and its page, configured for `fingerprint`. Partially
/// created state is torn down before an error is returned.
async fn open_context(browser: Arc<Browser>, fingerprint: &Fingerprint) -> CrawlResult<ChromiumSession> {
    let created = browser
        .execute(CreateBrowserContextParams::default())
        .await
        .map_err(cdp_err)?;
    let context_id = created.result.browser_context_id.clone();

    let mut target = CreateTargetParams::new("about:blank");
    target.browser_context_id = Some(context_id.clone());
    let page = match browser.new_page(target).await {
        Ok(page) => page,
        Err(e) => {
            dispose_context(&browser, context_id).await;
            return Err(cdp_err(e));
        }
    };

    if let Err(e) = configure_page(&browser, &page, &context_id, fingerprint).await {
        if let Err(close_err) = page.close().await {
            debug!("Failed to close half-configured page: {close_err}");
        }
        dispose_context(&browser, context_id).await;
        return Err(e);
    }

    debug!(
        "Opened browsing session {}x{} ({})",
        fingerprint.viewport.width, fingerprint.viewport.height, fingerprint.user_agent
    );
    Ok(ChromiumSession {
        browser,
        context_id,
        page,
    })
}

impl BrowserEngine for ChromiumEngine {
    type Session = ChromiumSession;

    /// Session setup runs on its own task. If the caller is cancelled before
    /// the session is handed over, the task closes it instead.
    async fn open_session(&self, fingerprint: &Fingerprint) -> CrawlResult<ChromiumSession> {
        let browser = Arc::clone(&self.browser);
        let fingerprint = fingerprint.clone();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let opened = open_context(browser, &fingerprint).await;
            if let Err(Ok(orphan)) = tx.send(opened) {
                debug!("Session opened after its task was cancelled, closing it");
                if let Err(e) = orphan.close().await {
                    warn!("Failed to close orphaned session: {e}");
                }
            }
        });

        rx.await
            .map_err(|_| CrawlError::Browser("session setup task dropped".to_string()))?
    }

    async fn shutdown(self) -> CrawlResult<()> {
        let Self {
            browser,
            handler,
            profile_dir,
        } = self;

        let mut errors = Vec::new();
        match Arc::try_unwrap(browser) {
            Ok(mut browser) => {
                debug!(target: "news_crawler::cleanup", "Closing browser");
                if let Err(e) = browser.close().await {
                    errors.push(format!("Browser close failed: {e}"));
                }
                if let Err(e) = browser.wait().await {
                    errors.push(format!("Browser wait failed: {e}"));
                }
            }
            Err(_) => {
                errors.push("Browser still referenced by open sessions".to_string());
            }
        }
        handler.abort();

        if let Err(e) = remove_profile_dir(&profile_dir) {
            errors.push(format!("Profile cleanup failed: {e}"));
        }

        match CleanupResult::from_errors(errors) {
            CleanupResult::Success => {
                info!(target: "news_crawler::cleanup", "Browser engine shut down cleanly");
            }
            CleanupResult::PartialFailure(errors) => {
                warn!(target: "news_crawler::cleanup", "Browser engine shutdown had errors: {errors:?}");
            }
        }
        Ok(())
    }
}

/// One isolated CDP browser context and its page.
pub struct ChromiumSession {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    page: Page,
}

impl BrowsingSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> CrawlResult<PageResponse> {
        self.page
            .goto(url)
            .await
            .map_err(|e| CrawlError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = match self.page.evaluate(NAVIGATION_STATUS_JS).await {
            Ok(result) => result.into_value::<u16>().unwrap_or(0),
            Err(e) => {
                debug!("Navigation status unavailable for {url}: {e}");
                0
            }
        };
        let content = self.page.content().await.map_err(|e| CrawlError::Navigation {
            url: url.to_string(),
            reason: format!("content unavailable: {e}"),
        })?;

        // Some Chrome builds leave responseStatus at 0 for loaded documents
        let status = if status == 0 && !content.is_empty() { 200 } else { status };
        Ok(PageResponse { status, content })
    }

    async fn apply_stealth(&self, fingerprint: &Fingerprint) -> CrawlResult<()> {
        crate::kromekover::inject(&self.page, fingerprint).await
    }

    async fn evaluate(&self, script: &str) -> CrawlResult<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(cdp_err)?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn clear_storage(&self) -> CrawlResult<()> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(cdp_err)?;
        self.page.evaluate(CLEAR_STORAGE_JS).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn close(self) -> CrawlResult<()> {
        let Self {
            browser,
            context_id,
            page,
        } = self;
        let page_result = page.close().await.map_err(cdp_err);
        browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
            .map_err(cdp_err)?;
        page_result
    }
}
