//! Company and stock lookups answered from web search.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::search::{extract_domain, SearchConfig, SearchResult, SearchType, SmartSearch};
use super::ToolResult;
use crate::error::ToolError;

const LOOKUP_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    pub description: String,
    pub website: Option<String>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: String,
    pub quotes: Vec<SearchResult>,
}

#[derive(Clone)]
pub struct DataLookupTool {
    search: SmartSearch,
}

impl DataLookupTool {
    pub fn new(search: SmartSearch) -> Self {
        Self { search }
    }

    pub async fn lookup_company(&self, name: &str) -> ToolResult<CompanyRecord> {
        let started = Instant::now();
        let outcome = self.company(name).await;
        ToolResult::timed(
            "lookup_company_info",
            json!({ "company_name": name }),
            started,
            outcome,
        )
    }

    pub async fn lookup_stock(&self, symbol: &str) -> ToolResult<StockRecord> {
        let started = Instant::now();
        let outcome = self.stock(symbol).await;
        ToolResult::timed(
            "lookup_stock_price",
            json!({ "symbol": symbol }),
            started,
            outcome,
        )
    }

    async fn company(&self, name: &str) -> Result<CompanyRecord, ToolError> {
        if name.trim().is_empty() {
            return Err(ToolError::SearchFailed("company name is empty".to_string()));
        }
        let config = SearchConfig {
            search_type: SearchType::Qa,
            max_results: LOOKUP_RESULTS,
            include_summary: false,
        };
        let response = self
            .search
            .smart_search(&format!("{name} company overview"), &config)
            .await?;

        Ok(CompanyRecord {
            name: name.to_string(),
            description: response
                .results
                .first()
                .map(|r| r.snippet.clone())
                .unwrap_or_default(),
            website: official_site(name, &response.results),
            sources: response.results.iter().map(|r| r.url.clone()).collect(),
        })
    }

    async fn stock(&self, symbol: &str) -> Result<StockRecord, ToolError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ToolError::SearchFailed("stock symbol is empty".to_string()));
        }
        let config = SearchConfig {
            search_type: SearchType::Qa,
            max_results: LOOKUP_RESULTS,
            include_summary: false,
        };
        let response = self
            .search
            .smart_search(&format!("{symbol} stock price"), &config)
            .await?;

        Ok(StockRecord {
            symbol,
            quotes: response.results,
        })
    }
}

/// First result whose domain contains the company name, ignoring case and spaces.
fn official_site(name: &str, results: &[SearchResult]) -> Option<String> {
    let needle: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    results
        .iter()
        .find(|r| extract_domain(&r.url).is_some_and(|d| d.to_lowercase().contains(&needle)))
        .map(|r| r.url.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::tools::search::{ProviderQuery, RawHit, SearchBackend};

    struct FixedBackend;

    #[async_trait]
    impl SearchBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn search(&self, query: &ProviderQuery) -> Result<Vec<RawHit>, ToolError> {
            Ok(vec![
                RawHit {
                    title: "Wiki".into(),
                    url: "https://en.wikipedia.org/wiki/Acme".into(),
                    content: format!("About: {}", query.query),
                    score: Some(0.9),
                },
                RawHit {
                    title: "Acme Corp".into(),
                    url: "https://www.acmecorp.com/".into(),
                    content: "Official site".into(),
                    score: Some(0.8),
                },
            ])
        }
    }

    fn tool() -> DataLookupTool {
        DataLookupTool::new(SmartSearch::new(Arc::new(FixedBackend)))
    }

    #[tokio::test]
    async fn test_lookup_company() {
        let result = tool().lookup_company("Acme Corp").await;
        assert!(result.success);
        let record = result.output.unwrap();
        assert_eq!(record.description, "About: Acme Corp company overview");
        assert_eq!(record.website.as_deref(), Some("https://www.acmecorp.com/"));
        assert_eq!(record.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_stock_normalizes_symbol() {
        let result = tool().lookup_stock(" aapl ").await;
        let record = result.output.unwrap();
        assert_eq!(record.symbol, "AAPL");
        assert_eq!(record.quotes.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_company_name_fails() {
        let result = tool().lookup_company("  ").await;
        assert!(!result.success);
        assert_eq!(result.tool_name, "lookup_company_info");
    }
}
