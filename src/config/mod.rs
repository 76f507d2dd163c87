use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Stock API client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// Dashboard output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    #[serde(default = "default_echarts_url")]
    pub echarts_url: String,

    /// Fixed seed for the synthetic series; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "stock-dashboard/0.1".to_string()
}
fn default_page_size() -> u32 {
    crate::models::PageRequest::DEFAULT_SIZE
}
fn default_output_path() -> PathBuf {
    PathBuf::from("out/dashboard.html")
}
fn default_echarts_url() -> String {
    "https://cdn.jsdelivr.net/npm/echarts@5/dist/echarts.min.js".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            echarts_url: default_echarts_url(),
            seed: None,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("STOCKDASH").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration, using defaults: {}", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
