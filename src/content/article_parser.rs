//! Article extraction from fetched HTML
//!
//! Content comes from the first preset container with enough text, else the
//! largest text block on the page. Title, publish date and source each have
//! their own fallback chain.

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::MIN_PARAGRAPH_CHARS;

const PRESET_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    ".content",
    "#main",
    ".main",
    ".post",
    "#article",
    ".article",
];

const SOURCE_META_SELECTORS: &[&str] = &[
    "meta[property='og:site_name']",
    "meta[name='publisher']",
    "meta[name='source']",
    "meta[name='og:site']",
    "meta[name='application-name']",
];

const DATE_META_SELECTORS: &[&str] = &[
    "meta[name='publishdate']",
    "meta[name='pubdate']",
    "meta[property='article:published_time']",
];

const DOMAIN_SOURCES: &[(&str, &str)] = &[
    ("www.bbc.com", "BBC News"),
    ("www.bbc.co.uk", "BBC News"),
    ("www.nytimes.com", "The New York Times"),
    ("www.theguardian.com", "The Guardian"),
    ("www.washingtonpost.com", "The Washington Post"),
    ("www.reuters.com", "Reuters"),
    ("www.cnn.com", "CNN"),
    ("www.aljazeera.com", "Al Jazeera"),
];

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

type DateFormatter = fn(&Captures<'_>) -> Option<(i32, u32, u32)>;

static DATE_PATTERNS: Lazy<Vec<(Regex, DateFormatter)>> = Lazy::new(|| {
    let patterns: [(String, DateFormatter); 5] = [
        (r"(\d{4})[-/](\d{2})[-/](\d{2})".to_string(), |c| {
            Some((num(c, 1)?, num(c, 2)?, num(c, 3)?))
        }),
        (r"(\d{2})[-/](\d{2})[-/](\d{4})".to_string(), |c| {
            Some((num(c, 3)?, num(c, 2)?, num(c, 1)?))
        }),
        (format!(r"(?i)\b({MONTHS})\s+(\d{{1,2}}),\s+(\d{{4}})"), |c| {
            Some((num(c, 3)?, month(c.get(1)?.as_str())?, num(c, 2)?))
        }),
        (format!(r"(?i)(\d{{1,2}})\s+({MONTHS})\s+(\d{{4}})"), |c| {
            Some((num(c, 3)?, month(c.get(2)?.as_str())?, num(c, 1)?))
        }),
        (r"(\d{4})年(\d{1,2})月(\d{1,2})日".to_string(), |c| {
            Some((num(c, 1)?, num(c, 2)?, num(c, 3)?))
        }),
    ];
    patterns
        .into_iter()
        .filter_map(|(pattern, formatter)| match Regex::new(&pattern) {
            Ok(regex) => Some((regex, formatter)),
            Err(e) => {
                warn!("Invalid date pattern {pattern}: {e}");
                None
            }
        })
        .collect()
});

fn num<T: std::str::FromStr>(caps: &Captures<'_>, group: usize) -> Option<T> {
    caps.get(group)?.as_str().parse().ok()
}

fn month(name: &str) -> Option<u32> {
    let index = MONTHS
        .split('|')
        .position(|m| m.eq_ignore_ascii_case(name))?;
    // Full names occupy 0..12, abbreviations (no "may") follow
    let month = if index < 12 {
        index + 1
    } else {
        [1, 2, 3, 4, 6, 7, 8, 9, 10, 11, 12][index - 12]
    };
    u32::try_from(month).ok()
}

/// Collapse whitespace runs and trim.
#[must_use]
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Find the first date in `text` and normalize it to `YYYY-MM-DD`.
#[must_use]
pub fn match_date_format(text: &str) -> Option<String> {
    DATE_PATTERNS.iter().find_map(|(regex, formatter)| {
        let caps = regex.captures(text)?;
        let (year, month, day) = formatter(&caps)?;
        let valid = (1900..=9999).contains(&year) && (1..=12).contains(&month) && (1..=31).contains(&day);
        valid.then(|| format!("{year:04}-{month:02}-{day:02}"))
    })
}

/// Visible text of an element, skipping script and style contents.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    clean_text(&out)
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// What the parser pulled out of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedArticle {
    pub title: String,
    pub publish_date: Option<String>,
    pub content: String,
    pub source: Option<String>,
}

/// Extraction collaborator consumed by the orchestrator.
pub trait ArticleExtractor: Send + Sync {
    fn extract(&self, url: &str, html: &str) -> Option<ParsedArticle>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserHistorySnapshot {
    pub preset_selector: u64,
    pub biggest_text_block: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct ParserHistory {
    preset_selector: AtomicU64,
    biggest_text_block: AtomicU64,
    failures: AtomicU64,
}

impl ParserHistory {
    #[must_use]
    pub fn snapshot(&self) -> ParserHistorySnapshot {
        ParserHistorySnapshot {
            preset_selector: self.preset_selector.load(Ordering::Relaxed),
            biggest_text_block: self.biggest_text_block.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub struct ArticleParser {
    history: ParserHistory,
}

impl ArticleParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn history(&self) -> ParserHistorySnapshot {
        self.history.snapshot()
    }

    fn preset_content(document: &Html) -> Option<(String, &'static str)> {
        PRESET_SELECTORS.iter().find_map(|css| {
            let sel = selector(css)?;
            let element = document.select(&sel).next()?;
            let text = visible_text(element);
            (text.chars().count() > MIN_PARAGRAPH_CHARS).then_some((text, *css))
        })
    }

    fn biggest_block(document: &Html) -> Option<String> {
        let sel = selector("p, div, article, section")?;
        document
            .select(&sel)
            .map(visible_text)
            .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS)
            .max_by_key(|text| text.chars().count())
    }

    fn title(document: &Html) -> String {
        let og = selector("meta[property='og:title']").and_then(|sel| {
            document
                .select(&sel)
                .find_map(|el| el.value().attr("content").map(clean_text))
        });
        let from_tag = |css: &str| {
            selector(css).and_then(|sel| document.select(&sel).next().map(visible_text))
        };
        og.filter(|t| !t.is_empty())
            .or_else(|| from_tag("title").filter(|t| !t.is_empty()))
            .or_else(|| from_tag("h1").filter(|t| !t.is_empty()))
            .unwrap_or_else(|| "Untitled".to_string())
    }

    fn publish_date(document: &Html) -> Option<String> {
        if let Some(sel) = selector("time")
            && let Some(time) = document.select(&sel).next()
        {
            let candidate = time
                .value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| visible_text(time));
            if let Some(date) = match_date_format(&candidate) {
                return Some(date);
            }
        }

        for css in DATE_META_SELECTORS {
            let Some(sel) = selector(css) else { continue };
            if let Some(date) = document
                .select(&sel)
                .filter_map(|el| el.value().attr("content"))
                .find_map(match_date_format)
            {
                return Some(date);
            }
        }

        let body = selector("body")
            .and_then(|sel| document.select(&sel).next().map(visible_text))?;
        match_date_format(&body)
    }

    fn source(document: &Html, url: &str) -> Option<String> {
        for css in SOURCE_META_SELECTORS {
            let Some(sel) = selector(css) else { continue };
            if let Some(value) = document
                .select(&sel)
                .filter_map(|el| el.value().attr("content"))
                .map(clean_text)
                .find(|value| value.chars().count() > 2)
            {
                return Some(value);
            }
        }

        if let Some(sel) = selector("title")
            && let Some(title) = document.select(&sel).next().map(visible_text)
        {
            if let Some(part) = title
                .split(['-', '|'])
                .map(clean_text)
                .find(|part| part.chars().count() > 2 && part.to_lowercase().contains("news"))
            {
                return Some(part);
            }
        }

        let host = url::Url::parse(url).ok()?.host_str()?.to_string();
        Some(
            DOMAIN_SOURCES
                .iter()
                .find(|(domain, _)| *domain == host)
                .map_or(host, |(_, name)| (*name).to_string()),
        )
    }
}

impl ArticleExtractor for ArticleParser {
    fn extract(&self, url: &str, html: &str) -> Option<ParsedArticle> {
        if html.trim().is_empty() {
            warn!("No HTML provided for extraction of {url}");
            self.history.failures.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let document = Html::parse_document(html);
        let content = if let Some((text, css)) = Self::preset_content(&document) {
            debug!("Extracted {url} with preset selector {css}");
            self.history.preset_selector.fetch_add(1, Ordering::Relaxed);
            text
        } else if let Some(text) = Self::biggest_block(&document) {
            debug!("Extracted {url} with biggest text block");
            self.history.biggest_text_block.fetch_add(1, Ordering::Relaxed);
            text
        } else {
            warn!("All extraction methods failed for {url}");
            self.history.failures.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let article = ParsedArticle {
            title: Self::title(&document),
            publish_date: Self::publish_date(&document),
            content,
            source: Self::source(&document, url),
        };
        info!("Parsed article '{}' from {url}", article.title);
        Some(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head>
            <title>Markets rally | Example News</title>
            <meta property="og:site_name" content="Example Wire">
        </head><body>
            <nav>Home Markets World</nav>
            <article>
                <h1>Markets rally</h1>
                <time datetime="2024-03-05T10:00:00Z">March 5, 2024</time>
                <p>Stocks rose sharply on Tuesday as investors cheered better than expected earnings.</p>
                <script>var tracking = "ignore me";</script>
            </article>
        </body></html>
    "#;

    #[test]
    fn test_extracts_preset_container() {
        let parser = ArticleParser::new();
        let article = parser.extract("https://example.com/a", PAGE).expect("article");
        assert_eq!(article.title, "Markets rally | Example News");
        assert_eq!(article.publish_date.as_deref(), Some("2024-03-05"));
        assert_eq!(article.source.as_deref(), Some("Example Wire"));
        assert!(article.content.contains("Stocks rose sharply"));
        assert!(!article.content.contains("ignore me"));
        assert_eq!(parser.history().preset_selector, 1);
    }

    #[test]
    fn test_falls_back_to_biggest_block_and_domain_source() {
        let html = format!(
            "<html><head><title>Story</title></head><body><div><p>{}</p></div></body></html>",
            "Long paragraph text that is clearly article body. ".repeat(3)
        );
        let parser = ArticleParser::new();
        let article = parser.extract("https://www.reuters.com/x", &html).expect("article");
        assert!(article.content.starts_with("Long paragraph"));
        assert_eq!(article.source.as_deref(), Some("Reuters"));
        assert_eq!(parser.history().biggest_text_block, 1);
    }

    #[test]
    fn test_thin_page_fails() {
        let parser = ArticleParser::new();
        assert!(parser.extract("https://a.example", "<p>short</p>").is_none());
        assert!(parser.extract("https://a.example", "   ").is_none());
        assert_eq!(parser.history().failures, 2);
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(match_date_format("2023/11/02"), Some("2023-11-02".into()));
        assert_eq!(match_date_format("05-03-2024"), Some("2024-03-05".into()));
        assert_eq!(match_date_format("Sept. aside, Jan 7, 2022"), Some("2022-01-07".into()));
        assert_eq!(match_date_format("on 9 December 2021"), Some("2021-12-09".into()));
        assert_eq!(match_date_format("2024年3月5日"), Some("2024-03-05".into()));
        assert_eq!(match_date_format("2024-13-40"), None);
        assert_eq!(match_date_format("no date here"), None);
    }
}
