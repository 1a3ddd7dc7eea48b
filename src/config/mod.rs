//! Configuration module for news crawling
//!
//! This module provides the `CrawlerConfig` struct, its nested option
//! sections, JSON loading with validation, and a fluent builder.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod types;

// Re-exports for public API
pub use builder::CrawlerConfigBuilder;
pub use types::{
    AdaptiveSettings, AnalyzerSettings, BrowserServiceSettings, BrowserSettings, BrowserType,
    CollectorSettings, CrawlerConfig, DataSaverSettings, FingerprintSettings, Geolocation,
    RetrySettings, SessionSettings, ThrottleSettings,
};
