//! Main crawl orchestration logic
//!
//! Drains the URL queue in batches, launches one browser engine per batch and
//! runs every URL of the batch as its own task. Each task walks the fixed
//! pipeline:
//! - identity and isolated session
//! - throttle gate, fetch with retry, adaptive feedback
//! - countermeasure plugins and identity rotation
//! - behavior simulation, extraction, labeling
//! - outcome persistence, then cleanup on every path

use futures::FutureExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

use super::adaptive::{AdaptiveManager, AdjustmentCounts};
use super::behavior::BehaviorSimulator;
use super::browser_service::BrowserService;
use super::cleanup::{CleanupResult, EnvironmentCleaner};
use super::crawl_types::{CrawlContext, OutcomeRecord, OutcomeStatus};
use super::fingerprint::FingerprintManager;
use super::page_timeout::with_page_timeout;
use super::plugins::{AntiBotPlugin, PluginManager};
use super::queue::UrlReceiver;
use super::request_manager::{RequestManager, RetryPolicy, RetryStatsSnapshot};
use super::session::{SessionManager, SessionUpdate};
use super::throttle::ThrottleManager;
use crate::browser::{BrowserEngine, BrowsingSession, EngineLauncher};
use crate::config::CrawlerConfig;
use crate::content::{
    ArticleExtractor, ArticleParser, ContentAnalyzer, NoopAnalyzer, OutcomeSink, ParsedArticle,
    detect_language,
};
use crate::error::{CrawlError, CrawlResult};
use crate::utils::{BATCH_PAUSE_MS, DEQUEUE_WAIT_MS, IDLE_PAUSE_MS};

/// Extraction, labeling and persistence plugged into the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn ArticleExtractor>,
    pub analyzer: Arc<dyn ContentAnalyzer>,
    pub sink: Arc<dyn OutcomeSink>,
}

impl Collaborators {
    /// Default extractor, neutral analyzer, and the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            extractor: Arc::new(ArticleParser::new()),
            analyzer: Arc::new(NoopAnalyzer),
            sink,
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn ArticleExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStatsSnapshot {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rotations: u64,
}

#[derive(Debug, Default)]
pub struct CrawlStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rotations: AtomicU64,
}

impl CrawlStats {
    fn record_outcome(&self, success: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = if success { &self.succeeded } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CrawlStatsSnapshot {
        CrawlStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
        }
    }
}

/// What a task holds that must survive a failed pipeline.
struct TaskResources<S> {
    session: Option<S>,
    article: Option<ParsedArticle>,
    language: Option<&'static str>,
}

impl<S> Default for TaskResources<S> {
    fn default() -> Self {
        Self {
            session: None,
            article: None,
            language: None,
        }
    }
}

impl<S> TaskResources<S> {
    /// A failed record carrying whatever the pipeline extracted.
    fn partial_record(&self, url: &str) -> OutcomeRecord {
        let mut record = OutcomeRecord::failed(url);
        if let Some(article) = &self.article {
            record.title = Some(article.title.clone());
            record.publish_date = article.publish_date.clone();
            record.content = Some(article.content.clone());
            record.source = article.source.clone();
        }
        record.language = self.language.map(str::to_string);
        record
    }
}

/// Resolves once shutdown is signalled. Never resolves without a signal.
async fn shutdown_requested(shutdown: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = shutdown else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Shared state every URL task reads.
struct CrawlerCore {
    config: CrawlerConfig,
    browser_service: BrowserService,
    request_manager: RequestManager,
    adaptive: AdaptiveManager,
    plugins: PluginManager,
    sessions: SessionManager,
    cleaner: EnvironmentCleaner,
    behavior: BehaviorSimulator,
    collaborators: Collaborators,
    stats: CrawlStats,
}

impl CrawlerCore {
    fn new(config: CrawlerConfig, collaborators: Collaborators) -> Self {
        let throttle = Arc::new(ThrottleManager::new(config.min_rate(), config.max_concurrent()));
        let browser_service =
            BrowserService::new(FingerprintManager::new(config.fingerprint().clone()), throttle);
        let request_manager =
            RequestManager::new(RetryPolicy::from(config.retry()), config.navigation_timeout());
        let plugins = PluginManager::new();
        plugins.register(Arc::new(AntiBotPlugin));

        Self {
            browser_service,
            request_manager,
            adaptive: AdaptiveManager::new(config.adaptive().clone()),
            plugins,
            sessions: SessionManager::new(config.session_timeout()),
            cleaner: EnvironmentCleaner::new(),
            behavior: BehaviorSimulator::new(),
            collaborators,
            stats: CrawlStats::default(),
            config,
        }
    }

    async fn persist(&self, record: OutcomeRecord) {
        let success = record.is_success();
        let url = record.url.clone();
        self.stats.record_outcome(success);

        if let Err(e) = self.collaborators.sink.add_record(record).await {
            error!("Failed to persist outcome for {url}: {e}");
        }
        if !success && let Err(e) = self.collaborators.sink.flush().await {
            error!("Failed to flush outcomes after {url}: {e}");
        }
    }

    /// Run one URL end to end. Never fails: every error becomes a failed
    /// outcome and cleanup runs on every path.
    async fn crawl_url<E: BrowserEngine>(
        &self,
        engine: &E,
        url: String,
        shutdown: Option<watch::Receiver<bool>>,
    ) {
        let session_id = self.sessions.create_session();
        let mut ctx = CrawlContext::new(url, session_id, self.config.retry().max_attempts);
        let mut resources = TaskResources::<E::Session>::default();

        let outcome = {
            let pipeline = self.pipeline(engine, &mut ctx, &mut resources);
            let task_timeout = self.config.task_timeout();
            let bounded = async move {
                match task_timeout {
                    Some(limit) => with_page_timeout(pipeline, limit, "Crawl task").await,
                    None => pipeline.await,
                }
            };
            tokio::select! {
                outcome = AssertUnwindSafe(bounded).catch_unwind() => outcome
                    .unwrap_or_else(|_| Err(CrawlError::Browser("crawl task panicked".to_string()))),
                () = shutdown_requested(shutdown) => Err(CrawlError::Cancelled),
            }
        };

        let record = match outcome {
            Ok(record) => record,
            Err(e) => {
                error!("Crawl failed for {}: {e}", ctx.url);
                resources.partial_record(&ctx.url)
            }
        };
        self.persist(record).await;

        match resources.session.take() {
            Some(session) => {
                if let CleanupResult::PartialFailure(errors) =
                    self.cleaner.clean_session(&ctx, &session).await
                {
                    warn!("Cleanup for {} completed with failures: {errors:?}", ctx.url);
                }
                self.sessions.close_session(&ctx.session_id);
                if let Err(e) = session.close().await {
                    warn!("Failed to close session for {}: {e}", ctx.url);
                }
            }
            None => {
                self.sessions.close_session(&ctx.session_id);
            }
        }
    }

    async fn pipeline<E: BrowserEngine>(
        &self,
        engine: &E,
        ctx: &mut CrawlContext,
        resources: &mut TaskResources<E::Session>,
    ) -> CrawlResult<OutcomeRecord> {
        let session = self
            .browser_service
            .open_session(engine, &mut resources.session)
            .await?;
        debug!("Session {} opened for {}", ctx.session_id, ctx.url);

        let content = {
            let permit = self.browser_service.limit_rate().await;
            let content = self.request_manager.send_request(session, ctx).await;

            let feedback = self.adaptive.classify(ctx.response.as_ref());
            ctx.feedback = feedback;
            self.adaptive.adjust(&feedback, ctx);
            self.browser_service
                .update_throttle_rate(self.adaptive.current_delay());
            permit.release();
            content
        };

        let mut update = SessionUpdate::default();
        update.state.insert("attempts".to_string(), Value::from(ctx.attempts));
        if let Some(response) = &ctx.response {
            update.state.insert("status".to_string(), Value::from(response.status));
        }
        self.sessions.maintain_session(&ctx.session_id, update);

        self.plugins.run_all(ctx).await;

        // Rotation swaps the session inside `resources`, so cleanup always
        // sees whichever session is live.
        let rotated = if ctx.adjust_fingerprint {
            self.browser_service
                .rotate(engine, &mut resources.session, "plugin_countermeasure")
                .await?;
            true
        } else {
            self.browser_service
                .process_page(engine, &mut resources.session, ctx.response.as_ref())
                .await?
        };
        if rotated {
            self.stats.rotations.fetch_add(1, Ordering::Relaxed);
        }

        // The plugin delay was already slept in run_all; here it only
        // raises the pacing floor for the next admissions.
        let adaptive_delay = self.adaptive.current_delay();
        let floor = ctx
            .suggested_delay
            .map_or(adaptive_delay, |suggested| suggested.max(adaptive_delay));
        self.browser_service.update_throttle_rate(floor);

        let content = match content {
            Some(content) if !ctx.stop_attempts => content,
            _ => {
                return Err(CrawlError::ContentUnavailable {
                    url: ctx.url.clone(),
                    attempts: ctx.attempts,
                });
            }
        };

        if self.config.simulate_behavior()
            && let Some(session) = resources.session.as_ref()
        {
            self.behavior.simulate(session).await;
        }

        let article = self
            .collaborators
            .extractor
            .extract(&ctx.url, &content)
            .ok_or_else(|| CrawlError::Extraction {
                url: ctx.url.clone(),
                reason: "no article content found".to_string(),
            })?;
        let language = detect_language(&article.content);
        resources.article = Some(article.clone());
        resources.language = Some(language);

        let analyzer_settings = self.config.analyzer();
        let analysis = self
            .collaborators
            .analyzer
            .analyze(
                &article.content,
                language,
                analyzer_settings.max_keywords,
                analyzer_settings.summary_length,
            )
            .await
            .ok_or_else(|| CrawlError::Analysis(format!("no analysis for {}", ctx.url)))?;

        let mut record = resources.partial_record(&ctx.url);
        record.keywords = analysis.keywords;
        record.summary = Some(analysis.summary);
        record.market_type = Some(analysis.labels.market_type);
        record.sentiment = Some(analysis.labels.sentiment);
        record.market_impact = Some(analysis.labels.market_impact);
        record.status = OutcomeStatus::Success;
        info!("Crawled {} in {} attempts", ctx.url, ctx.attempts);
        Ok(record)
    }
}

/// Queue consumer driving the per-URL pipeline.
pub struct NewsCrawler<L: EngineLauncher> {
    launcher: L,
    core: Arc<CrawlerCore>,
    receiver: UrlReceiver,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<L: EngineLauncher> NewsCrawler<L> {
    /// The built-in anti-bot plugin is registered up front.
    #[must_use]
    pub fn new(
        config: CrawlerConfig,
        launcher: L,
        receiver: UrlReceiver,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            launcher,
            core: Arc::new(CrawlerCore::new(config, collaborators)),
            receiver,
            shutdown: None,
        }
    }

    /// Stop when `shutdown` turns `true`. In-flight tasks record a failed
    /// outcome and clean up.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    #[must_use]
    pub fn config(&self) -> &CrawlerConfig {
        &self.core.config
    }

    #[must_use]
    pub fn plugin_manager(&self) -> &PluginManager {
        &self.core.plugins
    }

    #[must_use]
    pub fn browser_service(&self) -> &BrowserService {
        &self.core.browser_service
    }

    #[must_use]
    pub fn stats(&self) -> CrawlStatsSnapshot {
        self.core.stats.snapshot()
    }

    #[must_use]
    pub fn retry_stats(&self) -> RetryStatsSnapshot {
        self.core.request_manager.retry_stats()
    }

    #[must_use]
    pub fn adjustment_counts(&self) -> AdjustmentCounts {
        self.core.adaptive.adjustments()
    }

    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.core.adaptive.current_delay()
    }

    #[must_use]
    pub fn registered_plugins(&self) -> Vec<String> {
        self.core.plugins.registered_plugins()
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.core.sessions.active_count()
    }

    #[must_use]
    pub fn cleaned_sessions(&self) -> u64 {
        self.core.cleaner.cleaned_sessions()
    }

    fn shutdown_signalled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Consume the queue until it is closed and drained or shutdown fires.
    ///
    /// Buffered outcomes are flushed before returning.
    pub async fn run(&mut self) -> CrawlResult<CrawlStatsSnapshot> {
        info!(
            "Crawler started: batch size {}, max concurrent {}",
            self.core.config.batch_size(),
            self.core.config.max_concurrent()
        );

        loop {
            if self.shutdown_signalled() {
                info!("Shutdown requested, stopping crawler");
                break;
            }

            let batch = self
                .receiver
                .next_batch(
                    self.core.config.batch_size(),
                    Duration::from_millis(DEQUEUE_WAIT_MS),
                )
                .await;

            if batch.urls.is_empty() {
                if batch.closed {
                    info!("URL queue closed and drained");
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(IDLE_PAUSE_MS)) => {}
                    () = shutdown_requested(self.shutdown.clone()) => {
                        info!("Shutdown requested, stopping crawler");
                        break;
                    }
                }
                continue;
            }

            self.process_batch(batch.urls).await;
            tokio::time::sleep(Duration::from_millis(BATCH_PAUSE_MS)).await;
        }

        self.core.collaborators.sink.flush().await?;
        let stats = self.stats();
        info!(
            "Crawler finished: {} processed, {} succeeded, {} failed",
            stats.processed, stats.succeeded, stats.failed
        );
        Ok(stats)
    }

    async fn process_batch(&self, urls: Vec<String>) {
        info!("Processing batch of {} URLs", urls.len());

        let engine = match self.launcher.launch().await {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                error!("Failed to launch browser engine: {e}");
                for url in urls {
                    warn!("Recording {url} as failed: no browser engine");
                    self.core.persist(OutcomeRecord::failed(url)).await;
                }
                return;
            }
        };

        let mut tasks = FuturesUnordered::new();
        for url in urls {
            let core = Arc::clone(&self.core);
            let engine = Arc::clone(&engine);
            let shutdown = self.shutdown.clone();
            let task_url = url.clone();
            let handle = tokio::spawn(async move {
                core.crawl_url(engine.as_ref(), task_url, shutdown).await;
            });
            tasks.push(async move { (url, handle.await) });
        }

        while let Some((url, joined)) = tasks.next().await {
            if let Err(e) = joined {
                error!("Crawl task for {url} aborted: {e}");
                self.core.persist(OutcomeRecord::failed(url)).await;
            }
        }

        match Arc::try_unwrap(engine) {
            Ok(engine) => {
                if let Err(e) = engine.shutdown().await {
                    warn!("Browser engine shutdown failed: {e}");
                }
            }
            Err(engine) => warn!(
                "Browser engine still has {} references, shutdown skipped",
                Arc::strong_count(&engine)
            ),
        }
    }
}
