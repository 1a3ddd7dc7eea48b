//! Test utilities for the news_crawler test suite
//!
//! A scripted in-memory browser: every URL maps to a fixed status, body and
//! latency. Counters record what the crawler did with it.

use news_crawler::browser::{BrowserEngine, BrowsingSession, EngineLauncher, PageResponse};
use news_crawler::crawl_engine::Fingerprint;
use news_crawler::error::{CrawlError, CrawlResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One scripted page.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: u16,
    pub content: String,
    pub latency: Duration,
}

impl Scripted {
    #[allow(dead_code)]
    pub fn new(status: u16, content: impl Into<String>, latency: Duration) -> Self {
        Self {
            status,
            content: content.into(),
            latency,
        }
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub navigations: AtomicUsize,
    pub stealth_applied: AtomicUsize,
    pub storage_cleared: AtomicUsize,
}

impl Counters {
    #[allow(dead_code)]
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct FakeLauncher {
    pages: Arc<HashMap<String, Scripted>>,
    fallback: Scripted,
    pub counters: Arc<Counters>,
    pub fail_launch: bool,
    /// Stealth injection never completes from this call onwards (0-based).
    pub stall_stealth_from: Option<usize>,
}

impl FakeLauncher {
    #[allow(dead_code)]
    pub fn new(fallback: Scripted) -> Self {
        Self {
            pages: Arc::new(HashMap::new()),
            fallback,
            counters: Arc::new(Counters::default()),
            fail_launch: false,
            stall_stealth_from: None,
        }
    }

    #[allow(dead_code)]
    pub fn with_page(mut self, url: &str, page: Scripted) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.to_string(), page);
        self
    }
}

impl EngineLauncher for FakeLauncher {
    type Engine = FakeEngine;

    async fn launch(&self) -> CrawlResult<FakeEngine> {
        if self.fail_launch {
            return Err(CrawlError::Browser("no browser available".to_string()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEngine {
            pages: Arc::clone(&self.pages),
            fallback: self.fallback.clone(),
            counters: Arc::clone(&self.counters),
            stall_stealth_from: self.stall_stealth_from,
        })
    }
}

#[derive(Debug)]
pub struct FakeEngine {
    pages: Arc<HashMap<String, Scripted>>,
    fallback: Scripted,
    counters: Arc<Counters>,
    stall_stealth_from: Option<usize>,
}

impl BrowserEngine for FakeEngine {
    type Session = FakeSession;

    async fn open_session(&self, fingerprint: &Fingerprint) -> CrawlResult<FakeSession> {
        self.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            pages: Arc::clone(&self.pages),
            fallback: self.fallback.clone(),
            counters: Arc::clone(&self.counters),
            user_agent: fingerprint.user_agent.clone(),
            stall_stealth_from: self.stall_stealth_from,
        })
    }

    async fn shutdown(self) -> CrawlResult<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeSession {
    pages: Arc<HashMap<String, Scripted>>,
    fallback: Scripted,
    pub counters: Arc<Counters>,
    pub user_agent: String,
    stall_stealth_from: Option<usize>,
}

impl FakeSession {
    /// A standalone session that serves `page` for every URL.
    #[allow(dead_code)]
    pub fn serving(page: Scripted) -> Self {
        Self {
            pages: Arc::new(HashMap::new()),
            fallback: page,
            counters: Arc::new(Counters::default()),
            user_agent: "test-agent".to_string(),
            stall_stealth_from: None,
        }
    }
}

impl BrowsingSession for FakeSession {
    async fn navigate(&self, url: &str) -> CrawlResult<PageResponse> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        let page = self.pages.get(url).unwrap_or(&self.fallback).clone();
        tokio::time::sleep(page.latency).await;
        Ok(PageResponse {
            status: page.status,
            content: page.content,
        })
    }

    async fn apply_stealth(&self, _fingerprint: &Fingerprint) -> CrawlResult<()> {
        let applied = self.counters.stealth_applied.fetch_add(1, Ordering::SeqCst);
        if self.stall_stealth_from.is_some_and(|from| applied >= from) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> CrawlResult<Value> {
        Ok(Value::Null)
    }

    async fn clear_storage(&self) -> CrawlResult<()> {
        self.counters.storage_cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self) -> CrawlResult<()> {
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A small news page whose article body clears the extraction threshold.
#[allow(dead_code)]
pub fn article_page(headline: &str) -> String {
    format!(
        "<html><head><title>{headline}</title></head><body><article><p>\
         Central banks held rates steady on Tuesday as markets priced in cuts.\
         </p></article></body></html>"
    )
}
