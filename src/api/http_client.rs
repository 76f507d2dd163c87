use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::models::StockQuery;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::StockApi;

/// reqwest-backed client for the stock REST API. One attempt per query:
/// failures go straight back to the caller.
pub struct HttpStockApi {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpStockApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()?;

        Ok(Self {
            inner,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint URL with the query's parameters appended.
    pub fn query_url(&self, query: &StockQuery) -> Result<Url, ApiError> {
        let endpoint = format!("{}{}", self.base_url, query.mode.endpoint());
        Ok(Url::parse_with_params(&endpoint, query.params())?)
    }
}

#[async_trait]
impl StockApi for HttpStockApi {
    async fn fetch(&self, query: &StockQuery) -> Result<Value, ApiError> {
        let url = self.query_url(query)?;
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await?.error_for_status()?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PageRequest, QueryMode};

    fn client(base: &str) -> HttpStockApi {
        HttpStockApi::new(&ApiConfig {
            base_url: base.to_string(),
            ..Default::default()
        })
        .expect("client")
    }

    #[test]
    fn test_query_url_for_search() {
        let api = client("http://localhost:8080/");
        let mut q = StockQuery::new(QueryMode::Normal, PageRequest { num: 3, size: 9 });
        q.filter.ts_code = Some("600000.SH".into());
        q.filter.trade_date = Some("20240115".into());
        q.filter.price_max = Some(20.0);

        let url = api.query_url(&q).expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/stock/data?tsCode=600000.SH&tradeDate=20240115&priceMax=20&pageNum=3&size=9"
        );
    }

    #[test]
    fn test_query_url_for_list_modes() {
        let api = client("http://localhost:8080");
        let q = StockQuery::new(QueryMode::LimitDown, PageRequest::default());
        let url = api.query_url(&q).expect("url");
        assert_eq!(url.path(), "/api/stock/limit-down");
        assert_eq!(url.query(), Some("pageNum=1&size=9"));
    }

    #[test]
    fn test_bad_base_url() {
        let api = client("not a url");
        let q = StockQuery::default();
        assert!(matches!(api.query_url(&q), Err(ApiError::Url(_))));
    }

    // ── Round trips against a local server ──

    fn limit_up_query() -> StockQuery {
        StockQuery::new(QueryMode::LimitUp, PageRequest { num: 2, size: 9 })
    }

    #[tokio::test]
    async fn test_fetch_returns_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/stock/limit-up")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("pageNum".into(), "2".into()),
                mockito::Matcher::UrlEncoded("size".into(), "9".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"stock_count": 3, "grid_data": []}"#)
            .create_async()
            .await;

        let api = client(&server.url());
        let body = api.fetch(&limit_up_query()).await.expect("fetch");

        assert_eq!(body["stock_count"], 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_request_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/stock/limit-up")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body(r#"{"error": "boom"}"#)
            .create_async()
            .await;

        let err = client(&server.url()).fetch(&limit_up_query()).await.unwrap_err();
        match err {
            ApiError::Request(e) => assert_eq!(e.status().map(|s| s.as_u16()), Some(500)),
            other => panic!("expected request error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_non_json_body_is_body_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/stock/limit-up")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client(&server.url()).fetch(&limit_up_query()).await.unwrap_err();
        assert!(matches!(err, ApiError::Body(_)), "got {err}");
    }
}
