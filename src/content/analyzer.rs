//! LLM labeling of extracted article text
//!
//! The Ollama analyzer asks a local model for keywords, a summary and three
//! market labels. The model is instructed to answer with JSON; anything that
//! does not parse counts as a failed analysis.

use futures::future::BoxFuture;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::AnalyzerSettings;
use crate::error::{CrawlError, CrawlResult};
use crate::utils::MIN_PARAGRAPH_CHARS;

const FALLBACK_EN_PROMPT: &str = "Analyze the content: {content}";
const FALLBACK_ZH_PROMPT: &str = "分析内容：{content}";

fn default_market_type() -> String {
    "Other".to_string()
}

fn default_neutral() -> String {
    "Neutral".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    #[serde(default = "default_market_type")]
    pub market_type: String,
    #[serde(default = "default_neutral")]
    pub sentiment: String,
    #[serde(default = "default_neutral")]
    pub market_impact: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            market_type: default_market_type(),
            sentiment: default_neutral(),
            market_impact: default_neutral(),
        }
    }
}

/// Labeling result for one article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub labels: Labels,
}

/// Labeling collaborator consumed by the orchestrator.
///
/// `None` means the analysis failed and the article is recorded as failed.
pub trait ContentAnalyzer: Send + Sync {
    fn analyze<'a>(
        &'a self,
        content: &'a str,
        language: &'a str,
        max_keywords: usize,
        summary_length: usize,
    ) -> BoxFuture<'a, Option<Analysis>>;
}

/// `"zh"` when the text contains common Chinese particles, else `"en"`.
#[must_use]
pub fn detect_language(content: &str) -> &'static str {
    if content.contains(['的', '一', '是', '不']) {
        "zh"
    } else {
        "en"
    }
}

/// Prompt templates keyed by language.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    en: String,
    zh: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            en: FALLBACK_EN_PROMPT.to_string(),
            zh: FALLBACK_ZH_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Load `{"en": ..., "zh": ...}` from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file is unreadable, not JSON, or lacks either key.
    pub fn from_file(path: &Path) -> CrawlResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut map: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| CrawlError::Config(format!("invalid prompt file {}: {e}", path.display())))?;
        match (map.remove("en"), map.remove("zh")) {
            (Some(en), Some(zh)) => Ok(Self { en, zh }),
            _ => Err(CrawlError::Config(format!(
                "prompt file {} is missing 'en' or 'zh' templates",
                path.display()
            ))),
        }
    }

    /// Load from `path`, falling back to the built-in templates on any error.
    #[must_use]
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        Self::from_file(path).unwrap_or_else(|e| {
            error!("Failed to load prompt templates: {e}");
            Self::default()
        })
    }

    #[must_use]
    pub fn render(&self, language: &str, content: &str, max_keywords: usize, summary_length: usize) -> String {
        let template = if language == "zh" { &self.zh } else { &self.en };
        template
            .replace("{max_keywords}", &max_keywords.to_string())
            .replace("{summary_length}", &summary_length.to_string())
            .replace("{content}", content)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisHistorySnapshot {
    pub successful: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
pub struct AnalysisHistory {
    successful: AtomicU64,
    failed: AtomicU64,
}

impl AnalysisHistory {
    fn record(&self, ok: bool) {
        let counter = if ok { &self.successful } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> AnalysisHistorySnapshot {
        AnalysisHistorySnapshot {
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Analyzer backed by an Ollama `/api/generate` endpoint.
#[derive(Debug)]
pub struct OllamaAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    prompts: PromptTemplates,
    history: AnalysisHistory,
}

impl OllamaAnalyzer {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, settings: &AnalyzerSettings) -> CrawlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| CrawlError::Analysis(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: settings.model.clone(),
            prompts: PromptTemplates::load_or_default(settings.prompt_file.as_deref()),
            history: AnalysisHistory::default(),
        })
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    #[must_use]
    pub fn history(&self) -> AnalysisHistorySnapshot {
        self.history.snapshot()
    }

    async fn call_ollama(&self, prompt: &str) -> CrawlResult<String> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| CrawlError::Analysis(format!("Ollama call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Analysis(format!(
                "Ollama request failed with status {status}"
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CrawlError::Analysis(format!("invalid Ollama response: {e}")))?;
        Ok(generated.response)
    }

    async fn run(
        &self,
        content: &str,
        language: &str,
        max_keywords: usize,
        summary_length: usize,
    ) -> CrawlResult<Analysis> {
        if content.chars().count() < MIN_PARAGRAPH_CHARS {
            return Err(CrawlError::Analysis(
                "content too short or empty for analysis".to_string(),
            ));
        }
        let prompt = self.prompts.render(language, content, max_keywords, summary_length);
        let raw = self.call_ollama(&prompt).await?;
        serde_json::from_str(&raw)
            .map_err(|e| CrawlError::Analysis(format!("model output is not valid JSON: {e}")))
    }
}

impl ContentAnalyzer for OllamaAnalyzer {
    fn analyze<'a>(
        &'a self,
        content: &'a str,
        language: &'a str,
        max_keywords: usize,
        summary_length: usize,
    ) -> BoxFuture<'a, Option<Analysis>> {
        Box::pin(async move {
            match self.run(content, language, max_keywords, summary_length).await {
                Ok(analysis) => {
                    info!(
                        "Analyzed content: {} keywords, sentiment {}",
                        analysis.keywords.len(),
                        analysis.labels.sentiment
                    );
                    self.history.record(true);
                    Some(analysis)
                }
                Err(e) => {
                    warn!("Content analysis failed: {e}");
                    self.history.record(false);
                    None
                }
            }
        })
    }
}

/// Analyzer for crawls without an LLM: every article gets neutral labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalyzer;

impl ContentAnalyzer for NoopAnalyzer {
    fn analyze<'a>(
        &'a self,
        _content: &'a str,
        _language: &'a str,
        _max_keywords: usize,
        _summary_length: usize,
    ) -> BoxFuture<'a, Option<Analysis>> {
        Box::pin(async { Some(Analysis::default()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("市场今天的表现"), "zh");
        assert_eq!(detect_language("Markets rallied today"), "en");
    }

    #[test]
    fn test_render_fills_placeholders() {
        let prompts = PromptTemplates {
            en: "Give {max_keywords} keywords and {summary_length} words: {content}".into(),
            zh: FALLBACK_ZH_PROMPT.into(),
        };
        assert_eq!(
            prompts.render("en", "body", 5, 50),
            "Give 5 keywords and 50 words: body"
        );
        assert_eq!(prompts.render("zh", "正文", 5, 50), "分析内容：正文");
    }

    #[test]
    fn test_partial_model_output_gets_defaults() {
        let analysis: Analysis =
            serde_json::from_str(r#"{"keywords":["oil"],"labels":{"sentiment":"Positive"}}"#)
                .expect("parse");
        assert_eq!(analysis.keywords, vec!["oil"]);
        assert_eq!(analysis.summary, "");
        assert_eq!(analysis.labels.market_type, "Other");
        assert_eq!(analysis.labels.sentiment, "Positive");
        assert_eq!(analysis.labels.market_impact, "Neutral");
    }

    #[test]
    fn test_prompt_file_requires_both_languages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"en": "x {content}"}"#).expect("write");
        assert!(PromptTemplates::from_file(&path).is_err());
        let fallback = PromptTemplates::load_or_default(Some(&path));
        assert_eq!(fallback.render("en", "c", 1, 1), "Analyze the content: c");
    }

    #[tokio::test]
    async fn test_noop_analyzer_is_neutral() {
        let analysis = NoopAnalyzer.analyze("", "en", 5, 50).await.expect("analysis");
        assert_eq!(analysis.labels, Labels::default());
    }
}
