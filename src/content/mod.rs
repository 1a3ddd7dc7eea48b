//! Collaborators around the crawl core: extraction, labeling, persistence
//! and URL seeding.

pub mod analyzer;
pub mod article_parser;
pub mod data_saver;
pub mod url_source;

pub use analyzer::{
    Analysis, AnalysisHistory, AnalysisHistorySnapshot, ContentAnalyzer, Labels, NoopAnalyzer,
    OllamaAnalyzer, PromptTemplates, detect_language,
};
pub use article_parser::{
    ArticleExtractor, ArticleParser, ParsedArticle, ParserHistory, ParserHistorySnapshot,
    clean_text, match_date_format,
};
pub use data_saver::{JsonlDataSaver, MemorySink, OutcomeSink};
pub use url_source::FileUrlSource;
