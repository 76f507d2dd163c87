use crate::models::QueryMode;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain a response body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid API URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to read fixture {path:?}: {source}")]
    Fixture {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Response body is not JSON: {0}")]
    Body(#[from] serde_json::Error),
}

/// Why a load produced no charts. Both variants end up as a user notice.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to load {mode}: {source}")]
    Transport {
        mode: QueryMode,
        #[source]
        source: ApiError,
    },

    #[error("No {mode} found")]
    Empty { mode: QueryMode },
}
