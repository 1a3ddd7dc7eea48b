//! Types threaded through the per-URL pipeline
//!
//! `CrawlContext` is owned by exactly one URL task. Every component that
//! needs to leave a mark on the task (request manager, adaptive manager,
//! plugins) writes to one of its typed fields.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Geolocation;
use crate::config::BrowserType;

/// One captured fetch attempt. Replaced wholesale on every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSnapshot {
    pub content: String,
    pub status: u16,
    pub load_time: Duration,
}

impl ResponseSnapshot {
    #[must_use]
    pub fn new(content: impl Into<String>, status: u16, load_time: Duration) -> Self {
        Self {
            content: content.into(),
            status,
            load_time,
        }
    }

    /// Snapshot for an attempt that produced no response at all.
    #[must_use]
    pub fn failed(load_time: Duration) -> Self {
        Self::new(String::new(), 0, load_time)
    }

    /// True when the attempt never reached the server.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status == 0 && self.content.is_empty()
    }
}

/// Signals derived from a response by the adaptive manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Feedback {
    pub slow_down: bool,
    pub speed_up: bool,
    pub retry_needed: bool,
    pub captcha_detected: bool,
    pub waf_detected: bool,
}

/// What countermeasure plugins ask of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PluginHints {
    pub adjust_fingerprint: bool,
    pub suggested_delay: Option<Duration>,
}

impl PluginHints {
    /// Combine hints from several plugins: any rotation request wins and
    /// the longest suggested delay wins.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            adjust_fingerprint: self.adjust_fingerprint || other.adjust_fingerprint,
            suggested_delay: match (self.suggested_delay, other.suggested_delay) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

/// Mutable per-URL record. Never shared across tasks.
#[derive(Debug, Clone)]
pub struct CrawlContext {
    pub url: String,
    pub session_id: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub response: Option<ResponseSnapshot>,
    pub feedback: Feedback,
    /// Set when the retry budget is spent and the URL should be abandoned
    pub stop_attempts: bool,
    pub adjust_fingerprint: bool,
    pub suggested_delay: Option<Duration>,
}

impl CrawlContext {
    #[must_use]
    pub fn new(url: impl Into<String>, session_id: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            url: url.into(),
            session_id: session_id.into(),
            attempts: 0,
            max_attempts,
            response: None,
            feedback: Feedback::default(),
            stop_attempts: false,
            adjust_fingerprint: false,
            suggested_delay: None,
        }
    }

    /// Fold plugin hints into the context.
    pub fn apply_hints(&mut self, hints: PluginHints) {
        let merged = PluginHints {
            adjust_fingerprint: self.adjust_fingerprint,
            suggested_delay: self.suggested_delay,
        }
        .merge(hints);
        self.adjust_fingerprint = merged.adjust_fingerprint;
        self.suggested_delay = merged.suggested_delay;
    }

    #[must_use]
    pub fn retry_budget_spent(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Synthetic browser identity presented to target sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone_id: String,
    pub device_scale_factor: f64,
    pub geolocation: Geolocation,
    pub browser_type: BrowserType,
}

impl Fingerprint {
    /// `navigator.platform` value consistent with the user agent.
    #[must_use]
    pub fn platform(&self) -> &'static str {
        let ua = self.user_agent.as_str();
        if ua.contains("iPad") {
            "iPad"
        } else if ua.contains("Macintosh") {
            "MacIntel"
        } else if ua.contains("Linux") {
            "Linux x86_64"
        } else {
            "Win32"
        }
    }

    /// `Accept-Language` header value derived from the locale.
    #[must_use]
    pub fn accept_language(&self) -> String {
        match self.locale.split_once('-') {
            Some((lang, _)) => format!("{},{lang};q=0.9", self.locale),
            None => self.locale.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Final per-URL record handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub url: String,
    pub fetch_date: String,
    pub title: Option<String>,
    pub publish_date: Option<String>,
    pub content: Option<String>,
    pub source: Option<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
    pub market_type: Option<String>,
    pub sentiment: Option<String>,
    pub market_impact: Option<String>,
    pub language: Option<String>,
    pub status: OutcomeStatus,
}

impl OutcomeRecord {
    /// An empty failed record for `url`, stamped with the current time.
    #[must_use]
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetch_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            title: None,
            publish_date: None,
            content: None,
            source: None,
            keywords: Vec::new(),
            summary: None,
            market_type: None,
            sentiment: None,
            market_impact: None,
            language: None,
            status: OutcomeStatus::Failed,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
