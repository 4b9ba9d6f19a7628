//! Smart search: classify a query, decorate it for the chosen category,
//! run it against a provider and enrich the hits.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::truncate_chars;
use crate::error::ToolError;

/// Snippets are cut to this many characters.
const SNIPPET_CHARS: usize = 300;

/// Search category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    General,
    News,
    Academic,
    Product,
    TechDoc,
    Qa,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::General => "general",
            SearchType::News => "news",
            SearchType::Academic => "academic",
            SearchType::Product => "product",
            SearchType::TechDoc => "tech_doc",
            SearchType::Qa => "qa",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(SearchType::General),
            "news" => Ok(SearchType::News),
            "academic" => Ok(SearchType::Academic),
            "product" => Ok(SearchType::Product),
            "tech_doc" | "techdoc" => Ok(SearchType::TechDoc),
            "qa" => Ok(SearchType::Qa),
            other => Err(ToolError::Config(format!("unknown search type: {other}"))),
        }
    }
}

const NEWS_KEYWORDS: &[&str] = &[
    "新闻", "最新", "今日", "昨日", "报道", "发布", "宣布", "事件", "news", "latest", "breaking",
];
const ACADEMIC_KEYWORDS: &[&str] = &[
    "论文", "研究", "学术", "期刊", "引用", "作者", "paper", "research", "academic", "journal", "doi",
];
const PRODUCT_KEYWORDS: &[&str] = &[
    "价格", "购买", "产品", "评价", "品牌", "型号", "price", "buy", "product", "review", "brand",
];
const TECH_KEYWORDS: &[&str] = &[
    "教程", "文档", "代码", "编程", "api", "sdk", "tutorial", "documentation", "code", "programming",
];

/// Pick a category from query keywords. Checked in order: news, academic,
/// product, tech docs; anything else is general.
pub fn detect_search_type(query: &str) -> SearchType {
    let lower = query.to_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if has_any(NEWS_KEYWORDS) {
        SearchType::News
    } else if has_any(ACADEMIC_KEYWORDS) {
        SearchType::Academic
    } else if has_any(PRODUCT_KEYWORDS) {
        SearchType::Product
    } else if has_any(TECH_KEYWORDS) {
        SearchType::TechDoc
    } else {
        SearchType::General
    }
}

/// Coarse sentiment of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

const POSITIVE_WORDS: &[&str] = &[
    "好", "优秀", "成功", "增长", "提升", "突破", "growth", "success", "improve", "breakthrough",
    "record", "strong",
];
const NEGATIVE_WORDS: &[&str] = &[
    "坏", "失败", "下降", "问题", "危机", "困难", "decline", "failure", "crisis", "problem", "loss",
    "weak",
];

/// Count positive and negative marker words in `text`.
pub fn sentiment_counts(text: &str) -> (usize, usize) {
    let lower = text.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    (positive, negative)
}

pub fn analyze_sentiment(text: &str) -> Sentiment {
    let (positive, negative) = sentiment_counts(text);
    if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Category-specific metadata extracted from a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultDetails {
    News {
        publish_date: Option<String>,
        source: Option<String>,
        sentiment: Sentiment,
    },
    Academic {
        publication_year: Option<i32>,
        abstract_text: String,
    },
    Product {
        price: Option<String>,
        rating: Option<f64>,
        brand: Option<String>,
    },
    TechDoc {
        doc_type: String,
        programming_language: Option<String>,
    },
}

/// A single ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub relevance_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ResultDetails>,
}

/// Options for [`SmartSearch::smart_search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub search_type: SearchType,
    pub max_results: usize,
    pub include_summary: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_type: SearchType::General,
            max_results: 5,
            include_summary: true,
        }
    }
}

/// Unified search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub search_type: SearchType,
    pub query: String,
    pub results: Vec<SearchResult>,
    pub summary: String,
    pub total_results: usize,
    /// Seconds spent searching.
    pub search_time: f64,
    pub suggestions: Vec<String>,
}

/// Provider-level topic filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchTopic {
    #[default]
    General,
    News,
}

/// A fully decorated query handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQuery {
    pub query: String,
    pub max_results: usize,
    pub topic: SearchTopic,
    pub include_domains: Vec<String>,
}

impl ProviderQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results,
            topic: SearchTopic::General,
            include_domains: Vec::new(),
        }
    }
}

/// An undecorated hit as returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: Option<f64>,
}

/// A web search provider.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &ProviderQuery) -> Result<Vec<RawHit>, ToolError>;
}

/// Category-aware search on top of a [`SearchBackend`].
#[derive(Clone)]
pub struct SmartSearch {
    backend: Arc<dyn SearchBackend>,
}

impl SmartSearch {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run a search. A `General` request is reclassified from the query text.
    pub async fn smart_search(
        &self,
        query: &str,
        config: &SearchConfig,
    ) -> Result<SearchResponse, ToolError> {
        let started = Instant::now();

        let search_type = match config.search_type {
            SearchType::General => detect_search_type(query),
            other => other,
        };
        let provider_query = decorate_query(query, search_type, config.max_results);

        debug!(
            query = %provider_query.query,
            search_type = %search_type,
            backend = self.backend.name(),
            "Dispatching search"
        );

        let hits = self.backend.search(&provider_query).await?;
        let results: Vec<SearchResult> = hits
            .into_iter()
            .take(config.max_results)
            .map(|hit| enrich(hit, search_type))
            .collect();

        info!(query = %query, search_type = %search_type, count = results.len(), "Search completed");

        let summary = if config.include_summary {
            summarize_results(&results)
        } else {
            String::new()
        };

        Ok(SearchResponse {
            search_type,
            query: query.to_string(),
            total_results: results.len(),
            results,
            summary,
            search_time: started.elapsed().as_secs_f64(),
            suggestions: suggestions(query),
        })
    }
}

/// Shape the provider query for a category.
fn decorate_query(query: &str, search_type: SearchType, max_results: usize) -> ProviderQuery {
    let domains = |list: &[&str]| list.iter().map(|d| d.to_string()).collect::<Vec<_>>();
    let mut provider_query = ProviderQuery::new(query, max_results);

    match search_type {
        SearchType::News => {
            provider_query.query = format!("{query} news");
            provider_query.topic = SearchTopic::News;
        }
        SearchType::Academic => {
            provider_query.query = format!("{query} research paper");
            provider_query.include_domains =
                domains(&["arxiv.org", "scholar.google.com", "ieee.org", "acm.org"]);
        }
        SearchType::Product => {
            provider_query.query = format!("{query} price review");
        }
        SearchType::TechDoc => {
            provider_query.query = format!("{query} documentation tutorial");
            provider_query.include_domains = domains(&[
                "github.com",
                "stackoverflow.com",
                "docs.rs",
                "developer.mozilla.org",
            ]);
        }
        SearchType::General | SearchType::Qa => {}
    }

    provider_query
}

fn enrich(hit: RawHit, search_type: SearchType) -> SearchResult {
    let details = match search_type {
        SearchType::News => Some(ResultDetails::News {
            publish_date: extract_date(&hit.content),
            source: extract_domain(&hit.url),
            sentiment: analyze_sentiment(&hit.content),
        }),
        SearchType::Academic => Some(ResultDetails::Academic {
            publication_year: extract_year(&hit.content),
            abstract_text: truncate_chars(&hit.content, 500),
        }),
        SearchType::Product => Some(ResultDetails::Product {
            price: extract_price(&hit.content),
            rating: extract_rating(&hit.content),
            brand: extract_brand(&hit.content),
        }),
        SearchType::TechDoc => Some(ResultDetails::TechDoc {
            doc_type: if hit.url.to_lowercase().contains("api") {
                "api_reference".to_string()
            } else {
                "tutorial".to_string()
            },
            programming_language: detect_programming_language(&hit.content),
        }),
        SearchType::General | SearchType::Qa => None,
    };

    SearchResult {
        snippet: truncate_chars(&hit.content, SNIPPET_CHARS),
        title: hit.title,
        url: hit.url,
        relevance_score: hit.score,
        details,
    }
}

fn summarize_results(results: &[SearchResult]) -> String {
    match results.first() {
        None => "No relevant results found.".to_string(),
        Some(top) => format!(
            "Found {} relevant results. Top result: {}. {}...",
            results.len(),
            top.title,
            truncate_chars(&top.snippet, 100)
        ),
    }
}

fn suggestions(query: &str) -> Vec<String> {
    vec![
        format!("{query} latest developments"),
        format!("{query} overview"),
        format!("{query} use cases"),
    ]
}

fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn extract_date(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"\d{4}[-/]\d{1,2}[-/]\d{1,2}")
        .find(text)
        .map(|m| m.as_str().to_string())
}

fn extract_year(text: &str) -> Option<i32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"\b(?:19|20)\d{2}\b")
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_price(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"[¥$€£]\s?\d+(?:\.\d+)?")
        .find(text)
        .map(|m| m.as_str().to_string())
}

fn extract_rating(text: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(\d+(?:\.\d+)?)\s*(?:/\s*5|stars?|分)")
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

const BRANDS: &[&str] = &[
    "Apple", "Samsung", "Huawei", "Xiaomi", "Google", "Microsoft", "Sony", "苹果", "华为", "小米",
    "三星",
];

fn extract_brand(text: &str) -> Option<String> {
    BRANDS
        .iter()
        .find(|brand| text.contains(*brand))
        .map(|brand| brand.to_string())
}

fn detect_programming_language(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = static_regex(
        &RE,
        r"(?i)\b(rust|python|javascript|typescript|golang|java|kotlin|swift)\b",
    );
    re.find(text).map(|m| match m.as_str().to_lowercase().as_str() {
        "golang" => "go".to_string(),
        other => other.to_string(),
    })
}

/// Extract the domain name from a URL.
pub(crate) fn extract_domain(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_search_type() {
        assert_eq!(detect_search_type("latest AI news"), SearchType::News);
        assert_eq!(detect_search_type("transformer research"), SearchType::Academic);
        assert_eq!(detect_search_type("iphone price"), SearchType::Product);
        assert_eq!(detect_search_type("tokio tutorial"), SearchType::TechDoc);
        assert_eq!(detect_search_type("rust ownership"), SearchType::General);
        assert_eq!(detect_search_type("人工智能 最新 进展"), SearchType::News);
    }

    #[test]
    fn test_news_takes_precedence_over_academic() {
        assert_eq!(detect_search_type("breaking research"), SearchType::News);
    }

    #[test]
    fn test_search_type_parse() {
        assert_eq!("tech_doc".parse::<SearchType>().unwrap(), SearchType::TechDoc);
        assert_eq!(" News ".parse::<SearchType>().unwrap(), SearchType::News);
        assert!("images".parse::<SearchType>().is_err());
    }

    #[test]
    fn test_sentiment() {
        assert_eq!(analyze_sentiment("record growth and success"), Sentiment::Positive);
        assert_eq!(analyze_sentiment("a deep crisis and decline"), Sentiment::Negative);
        assert_eq!(analyze_sentiment("the weather today"), Sentiment::Neutral);
    }

    #[test]
    fn test_decorate_query() {
        let news = decorate_query("rust", SearchType::News, 5);
        assert_eq!(news.query, "rust news");
        assert_eq!(news.topic, SearchTopic::News);

        let academic = decorate_query("rust", SearchType::Academic, 5);
        assert!(academic.include_domains.contains(&"arxiv.org".to_string()));

        let general = decorate_query("rust", SearchType::General, 3);
        assert_eq!(general, ProviderQuery::new("rust", 3));
    }

    #[test]
    fn test_extractors() {
        assert_eq!(extract_date("published 2024-03-15 by"), Some("2024-03-15".to_string()));
        assert_eq!(extract_year("in 2021 the team"), Some(2021));
        assert_eq!(extract_price("now only $199.99!"), Some("$199.99".to_string()));
        assert_eq!(extract_rating("rated 4.5 stars"), Some(4.5));
        assert_eq!(extract_brand("the new Samsung phone"), Some("Samsung".to_string()));
        assert_eq!(detect_programming_language("async Rust guide"), Some("rust".to_string()));
        assert_eq!(detect_programming_language("Golang channels"), Some("go".to_string()));
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.example.com/page"),
            Some("www.example.com".to_string())
        );
        assert_eq!(extract_domain("not a url"), None);
    }

    #[test]
    fn test_enrich_truncates_snippet() {
        let hit = RawHit {
            title: "Long".to_string(),
            url: "https://news.example.com/a".to_string(),
            content: "x".repeat(1000),
            score: Some(0.9),
        };
        let result = enrich(hit, SearchType::News);
        assert_eq!(result.snippet.chars().count(), SNIPPET_CHARS);
        assert!(matches!(result.details, Some(ResultDetails::News { .. })));
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(summarize_results(&[]), "No relevant results found.");
    }
}
