pub mod http_client;

use crate::error::ApiError;
use crate::models::StockQuery;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

pub use self::http_client::HttpStockApi;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable source of raw API response bodies.
#[async_trait]
pub trait StockApi: Send + Sync {
    async fn fetch(&self, query: &StockQuery) -> Result<Value, ApiError>;
}

// ── Saved responses ───────────────────────────────────────────────────────────

/// Serves one saved response body for every query. Used by `replay`.
pub struct FixtureApi {
    path: PathBuf,
}

impl FixtureApi {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StockApi for FixtureApi {
    async fn fetch(&self, query: &StockQuery) -> Result<Value, ApiError> {
        debug!("Replaying {:?} for {}", self.path, query.mode);

        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ApiError::Fixture {
                path: self.path.clone(),
                source,
            })?;
        Ok(serde_json::from_str(&text)?)
    }
}
