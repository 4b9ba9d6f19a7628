//! Tavily Search provider
//!
//! Web search through the Tavily Search API, with HTTP timeout and retry
//! with exponential backoff on transient failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::search::{ProviderQuery, RawHit, SearchBackend, SearchTopic};
use crate::error::ToolError;

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com";

/// Default timeout for Tavily API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Tavily-backed [`SearchBackend`].
pub struct TavilySearch {
    api_key: String,
    endpoint: String,
    client: Client,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Point at a different API base URL (used by tests against a mock server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn execute_with_retry(&self, request: &TavilyRequest) -> Result<TavilyResponse, ToolError> {
        let mut attempt = 0;
        loop {
            match self.execute_single_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_base_delay * 2u32.pow(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Tavily request failed, will retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_single_request(
        &self,
        request: &TavilyRequest,
    ) -> Result<TavilyResponse, ToolError> {
        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout
                } else {
                    ToolError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TavilyResponse>()
                .await
                .map_err(|e| ToolError::InvalidResponse(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 => Err(ToolError::Config("Tavily rejected the API key".to_string())),
            429 => Err(ToolError::RateLimited),
            code @ 500..=599 => {
                debug!(status = code, body = %error_text, "Tavily server error");
                Err(ToolError::ServerError(code))
            }
            code => Err(ToolError::SearchFailed(format!("HTTP {code}: {error_text}"))),
        }
    }
}

#[async_trait]
impl SearchBackend for TavilySearch {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &ProviderQuery) -> Result<Vec<RawHit>, ToolError> {
        let request = TavilyRequest {
            query: query.query.clone(),
            max_results: query.max_results,
            search_depth: "advanced",
            topic: match query.topic {
                SearchTopic::General => "general",
                SearchTopic::News => "news",
            },
            include_domains: query.include_domains.clone(),
        };

        debug!(query = %request.query, max_results = request.max_results, "Calling Tavily");
        let response = self.execute_with_retry(&request).await?;

        Ok(response
            .results
            .into_iter()
            .map(|r| RawHit {
                title: r.title,
                url: r.url,
                content: r.content,
                score: r.score,
            })
            .collect())
    }
}

/// Request body for Tavily API
#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    max_results: usize,
    search_depth: &'static str,
    topic: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
}

/// Response from Tavily API
#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let tool = TavilySearch::new("key")
            .with_endpoint("http://localhost:1234/")
            .with_max_retries(1)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(tool.endpoint, "http://localhost:1234");
        assert_eq!(tool.max_retries, 1);
        assert_eq!(tool.timeout, Duration::from_secs(5));
        assert_eq!(tool.name(), "tavily");
    }

    #[test]
    fn test_request_omits_empty_domains() {
        let request = TavilyRequest {
            query: "q".into(),
            max_results: 3,
            search_depth: "advanced",
            topic: "news",
            include_domains: vec![],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("include_domains").is_none());
        assert_eq!(json["topic"], "news");
    }
}
