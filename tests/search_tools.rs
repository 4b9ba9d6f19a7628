//! Search providers against a mock HTTP server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ai_research_workflow::error::ToolError;
use ai_research_workflow::tools::{
    DuckDuckGoSearch, ProviderQuery, ResultDetails, SearchBackend, SearchConfig, SearchType,
    SmartSearch, TavilySearch,
};

fn tavily_body() -> serde_json::Value {
    json!({
        "results": [
            {
                "title": "Tokio tutorial",
                "url": "https://tokio.rs/tokio/tutorial",
                "content": "Tokio is an asynchronous runtime for Rust. Published 2024-03-01, a big success.",
                "score": 0.93
            },
            {
                "title": "Async book",
                "url": "https://rust-lang.github.io/async-book/",
                "content": "Asynchronous programming in Rust.",
                "score": 0.81
            }
        ]
    })
}

fn tavily(server: &MockServer) -> TavilySearch {
    TavilySearch::new("test-key")
        .with_endpoint(server.uri())
        .with_retry_base_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn test_tavily_maps_hits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tavily_body()))
        .expect(1)
        .mount(&server)
        .await;

    let hits = tavily(&server)
        .search(&ProviderQuery::new("tokio", 5))
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].title, "Tokio tutorial");
    assert_eq!(hits[0].url, "https://tokio.rs/tokio/tutorial");
    assert_eq!(hits[0].score, Some(0.93));
}

#[tokio::test]
async fn test_tavily_retries_rate_limit_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tavily_body()))
        .expect(1)
        .mount(&server)
        .await;

    let hits = tavily(&server)
        .search(&ProviderQuery::new("tokio", 5))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_tavily_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = tavily(&server)
        .with_max_retries(2)
        .search(&ProviderQuery::new("tokio", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::ServerError(503)));
}

#[tokio::test]
async fn test_tavily_rejected_key_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = tavily(&server)
        .search(&ProviderQuery::new("tokio", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Config(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_smart_search_news_uses_news_topic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "topic": "news", "query": "rust 2024 news" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tavily_body()))
        .expect(1)
        .mount(&server)
        .await;

    let search = SmartSearch::new(Arc::new(tavily(&server)));
    let config = SearchConfig {
        search_type: SearchType::News,
        max_results: 1,
        include_summary: true,
    };
    let response = search.smart_search("rust 2024", &config).await.unwrap();

    assert_eq!(response.search_type, SearchType::News);
    assert_eq!(response.query, "rust 2024");
    assert_eq!(response.total_results, 1);
    assert!(response.summary.starts_with("Found 1 relevant results"));
    match &response.results[0].details {
        Some(ResultDetails::News {
            publish_date,
            source,
            ..
        }) => {
            assert_eq!(publish_date.as_deref(), Some("2024-03-01"));
            assert_eq!(source.as_deref(), Some("tokio.rs"));
        }
        other => panic!("expected news details, got {other:?}"),
    }
}

#[tokio::test]
async fn test_smart_search_reclassifies_general_queries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({ "include_domains": ["github.com"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tavily_body()))
        .expect(1)
        .mount(&server)
        .await;

    let search = SmartSearch::new(Arc::new(tavily(&server)));
    let response = search
        .smart_search("tokio tutorial", &SearchConfig::default())
        .await
        .unwrap();

    assert_eq!(response.search_type, SearchType::TechDoc);
    assert!(response
        .results
        .iter()
        .all(|r| matches!(r.details, Some(ResultDetails::TechDoc { .. }))));
}

#[tokio::test]
async fn test_duckduckgo_parses_result_page() {
    let server = MockServer::start().await;
    let page = r#"
        <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdocs.rs%2Ftokio&rut=abc">Tokio</a>
        <a class="result__url" href="https://tokio.rs/">tokio.rs</a>
    "#;
    Mock::given(method("GET"))
        .and(path("/html/"))
        .and(query_param("q", "tokio"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;

    let backend = DuckDuckGoSearch::new()
        .with_base_url(format!("{}/html/", server.uri()))
        .with_politeness_delay(Duration::ZERO);
    let hits = backend.search(&ProviderQuery::new("tokio", 5)).await.unwrap();

    let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
    assert_eq!(urls, vec!["https://docs.rs/tokio", "https://tokio.rs/"]);
    assert_eq!(hits[0].title, "docs.rs");
}

#[tokio::test]
async fn test_duckduckgo_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let backend = DuckDuckGoSearch::new()
        .with_base_url(format!("{}/html/", server.uri()))
        .with_politeness_delay(Duration::ZERO);
    let err = backend
        .search(&ProviderQuery::new("tokio", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::RateLimited));
}
