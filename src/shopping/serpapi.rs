use crate::config::SearchConfig;
use crate::http::build_client;
use crate::models::PriceRecord;
use crate::shopping::{SearchError, ShoppingSearch};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const ENGINE: &str = "google_shopping";

#[derive(Debug, Clone)]
pub struct SerpApiClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl SerpApiClient {
    /// Returns `None` when no credential is configured; enrichment is then skipped.
    pub fn from_config(config: &SearchConfig, connect_timeout: Duration) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            base_url: config.base_url.clone(),
            api_key,
            http: build_client(config.timeout, connect_timeout),
        })
    }
}

#[async_trait]
impl ShoppingSearch for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<PriceRecord>, SearchError> {
        let response = self
            .http
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("engine", ENGINE),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|err| SearchError::Request(err.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|err| SearchError::Deserialize(err.to_string()))?;
        Ok(listings_from_response(payload))
    }
}

fn listings_from_response(payload: SearchResponse) -> Vec<PriceRecord> {
    if payload.shopping_results.is_empty()
        && let Some(message) = payload.error
    {
        debug!(target: "itemlens.search", message = %message, "search_reported_no_results");
    }
    payload
        .shopping_results
        .into_iter()
        .map(|result| PriceRecord {
            price: result.price,
            title: result.title,
            source: result.source,
            link: result.link.or(result.product_link),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    shopping_results: Vec<ShoppingResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShoppingResult {
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    product_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::serve_stub;
    use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
    use serde_json::json;
    use std::collections::HashMap;

    fn client_for(base_url: String) -> SerpApiClient {
        let config = SearchConfig {
            api_key: Some("serp-key".into()),
            base_url,
            timeout: Duration::from_secs(5),
        };
        SerpApiClient::from_config(&config, Duration::from_secs(1)).unwrap()
    }

    fn parse(value: serde_json::Value) -> Vec<PriceRecord> {
        listings_from_response(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn keeps_service_order_and_fields() {
        let listings = parse(json!({
            "search_metadata": {"status": "Success"},
            "shopping_results": [
                {"position": 1, "title": "Kettle KT-200", "price": "$39.99", "extracted_price": 39.99,
                 "source": "Walmart", "link": "https://shop.example/kt-200"},
                {"position": 2, "title": "Kettle KT-200 Refurb", "price": "$19.99", "source": "eBay"}
            ]
        }));
        assert_eq!(listings.len(), 2);
        assert_eq!(
            listings[0],
            PriceRecord {
                price: Some("$39.99".into()),
                title: Some("Kettle KT-200".into()),
                source: Some("Walmart".into()),
                link: Some("https://shop.example/kt-200".into()),
            }
        );
        assert_eq!(listings[1].link, None);
    }

    #[test]
    fn product_link_fills_missing_link() {
        let listings = parse(json!({
            "shopping_results": [
                {"title": "Kettle", "price": "$10.00", "product_link": "https://google.example/p/1"}
            ]
        }));
        assert_eq!(listings[0].link.as_deref(), Some("https://google.example/p/1"));
    }

    #[test]
    fn error_body_without_results_is_empty() {
        let listings = parse(json!({
            "error": "Google hasn't returned any results for this query."
        }));
        assert!(listings.is_empty());
    }

    #[test]
    fn client_requires_a_credential() {
        let config = SearchConfig {
            api_key: None,
            base_url: "https://serpapi.com".into(),
            timeout: Duration::from_secs(10),
        };
        assert!(SerpApiClient::from_config(&config, Duration::from_secs(5)).is_none());
    }

    #[tokio::test]
    async fn search_sends_engine_query_and_key() {
        let router = Router::new().route(
            "/search.json",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params["engine"], "google_shopping");
                assert_eq!(params["q"], "ABC-123");
                assert_eq!(params["api_key"], "serp-key");
                Json(json!({
                    "shopping_results": [
                        {"title": "ABC-123 Kettle", "price": "$39.99", "source": "Walmart",
                         "product_link": "https://google.example/p/abc"}
                    ]
                }))
            }),
        );
        let client = client_for(serve_stub(router).await);
        let listings = client.search("ABC-123").await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].price.as_deref(), Some("$39.99"));
        assert_eq!(listings[0].link.as_deref(), Some("https://google.example/p/abc"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_request_error() {
        let router = Router::new().route(
            "/search.json",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        );
        let client = client_for(serve_stub(router).await);
        let err = client.search("ABC-123").await.unwrap_err();
        assert!(
            matches!(err, SearchError::Request(ref msg) if msg == "HTTP 500 Internal Server Error"),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn non_json_body_is_a_deserialize_error() {
        let router = Router::new().route("/search.json", get(|| async { "<html>nope</html>" }));
        let client = client_for(serve_stub(router).await);
        let err = client.search("ABC-123").await.unwrap_err();
        assert!(matches!(err, SearchError::Deserialize(_)));
    }
}
