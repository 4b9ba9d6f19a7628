//! DuckDuckGo search provider (no API key needed).
//!
//! DuckDuckGo has no free web search API, so this scrapes the HTML endpoint.
//! Only result URLs are reliable there; titles fall back to the domain name.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::search::{extract_domain, ProviderQuery, RawHit, SearchBackend};
use crate::error::ToolError;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Keyless [`SearchBackend`] over DuckDuckGo's HTML results page.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    base_url: String,
    timeout: Duration,
    /// Pause before each request; DuckDuckGo rate limits aggressively.
    politeness_delay: Duration,
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self {
            base_url: "https://html.duckduckgo.com/html/".to_string(),
            timeout: Duration::from_secs(30),
            politeness_delay: Duration::from_millis(500),
        }
    }
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &ProviderQuery) -> Result<Vec<RawHit>, ToolError> {
        tokio::time::sleep(self.politeness_delay).await;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        // DuckDuckGo has no domain filter parameter; fold the first hint into the query.
        let query_text = match query.include_domains.first() {
            Some(domain) => format!("{} site:{}", query.query, domain),
            None => query.query.clone(),
        };
        let url = format!("{}?q={}", self.base_url, urlencoding::encode(&query_text));

        debug!(url = %url, "Fetching search results");

        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ToolError::RateLimited);
            }
            return Err(ToolError::SearchFailed(format!("HTTP {}", response.status())));
        }

        let body = response.text().await?;
        let hits = parse_html(&body, query.max_results);
        if hits.is_empty() {
            warn!(query = %query.query, "No search results found");
        }
        Ok(hits)
    }
}

/// Extract result links from a DuckDuckGo HTML page.
fn parse_html(html: &str, max_results: usize) -> Vec<RawHit> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |url: String, urls: &mut Vec<String>| {
        if url.starts_with("http") && !url.contains("duckduckgo.com") && seen.insert(url.clone()) {
            urls.push(url);
        }
    };

    // Redirect links carry the target in the `uddg` parameter.
    for segment in html.split("uddg=").skip(1) {
        if let Some(end) = segment.find(['&', '"', '\'']) {
            if let Ok(url) = urlencoding::decode(&segment[..end]) {
                push(url.into_owned(), &mut urls);
            }
        }
    }

    // Fallback: visible result URLs.
    for segment in html.split("result__url").skip(1) {
        let Some(href_start) = segment.find("href=\"") else {
            continue;
        };
        let after_href = &segment[href_start + 6..];
        if let Some(href_end) = after_href.find('"') {
            let href = &after_href[..href_end];
            let url = if let Some(rest) = href.strip_prefix("//") {
                format!("https://{rest}")
            } else {
                href.to_string()
            };
            push(url, &mut urls);
        }
    }

    urls.into_iter()
        .take(max_results)
        .map(|url| RawHit {
            title: extract_domain(&url).unwrap_or_else(|| "Result".to_string()),
            content: format!("Search result from {}", extract_domain(&url).unwrap_or_default()),
            url,
            score: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_redirect_links() {
        let html = r#"<a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2Flearn&rut=x">Rust</a>
                      <a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Ftokio.rs%2F&rut=y">Tokio</a>"#;
        let hits = parse_html(html, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.rust-lang.org/learn");
        assert_eq!(hits[0].title, "www.rust-lang.org");
        assert_eq!(hits[1].url, "https://tokio.rs/");
    }

    #[test]
    fn test_parse_dedupes_and_limits() {
        let html = r#"uddg=https%3A%2F%2Fa.com&x uddg=https%3A%2F%2Fa.com&x uddg=https%3A%2F%2Fb.com&x uddg=https%3A%2F%2Fc.com&x"#;
        let hits = parse_html(html, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.com");
        assert_eq!(hits[1].url, "https://b.com");
    }

    #[test]
    fn test_parse_visible_urls() {
        let html = r#"<a class="result__url" href="//docs.rs/tokio">docs.rs/tokio</a>"#;
        let hits = parse_html(html, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://docs.rs/tokio");
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_html("<html></html>", 5).is_empty());
    }
}
