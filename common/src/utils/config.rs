use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
    S3,
}

/// Application-wide configuration, layered `config.toml` (optional) +
/// environment variables, per the enumerated env vars in the external
/// interfaces section.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    // Relational / graph backend (SurrealDB serves both; `DB_URL`/`GRAPH_URL`
    // point at the same cluster unless the operator splits them).
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default)]
    pub graph_url: Option<String>,
    #[serde(default)]
    pub graph_auth: Option<String>,

    // LLM provider
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,

    // Embedding (C6)
    #[serde(default = "default_embed_provider")]
    pub embed_provider: String,
    #[serde(default)]
    pub embed_fallback_provider: Option<String>,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_embed_dim")]
    pub embed_dim: u32,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default = "default_embed_max_tokens_per_request")]
    pub embed_max_tokens_per_request: u32,
    #[serde(default)]
    pub embed_rate_limit_qps: Option<f64>,

    // Rerank (C9)
    #[serde(default)]
    pub rerank_provider: Option<String>,
    #[serde(default)]
    pub rerank_model: Option<String>,

    // Knowledge graph (C7): cosine-similarity floor above which entity
    // resolution auto-merges a candidate into an existing node.
    #[serde(default = "default_entity_merge_threshold")]
    pub entity_merge_threshold: f64,

    // Object store (C2)
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default)]
    pub blob_bucket: Option<String>,
    #[serde(default)]
    pub blob_credentials: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    // Shared cache (C12 / §5)
    #[serde(default)]
    pub cache_url: Option<String>,
    #[serde(default)]
    pub cache_token: Option<String>,

    // Job queue / worker runtime (C3/C4)
    #[serde(default = "default_max_job_concurrency")]
    pub max_job_concurrency: u32,
    #[serde(default = "default_visibility_timeout_seconds")]
    pub visibility_timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    // Observability (C12)
    #[serde(default)]
    pub daily_cost_alert_usd: Option<f64>,
    #[serde(default)]
    pub error_rate_alert_pct: Option<f64>,

    // Feature flag overrides, `FEATURE_<name>` folded in by the `Environment`
    // source's `try_parsing`/custom separator below.
    #[serde(default)]
    pub feature: HashMap<String, bool>,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    // HTTP API surface (C1/§6)
    #[serde(default = "default_document_upload_max_body_bytes")]
    pub document_upload_max_body_bytes: usize,
    #[serde(default)]
    pub internal_webhook_secret: Option<String>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embed_provider() -> String {
    "openai".to_string()
}

fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embed_dim() -> u32 {
    1536
}

fn default_embed_batch_size() -> usize {
    64
}

fn default_embed_max_tokens_per_request() -> u32 {
    8_191
}

fn default_entity_merge_threshold() -> f64 {
    0.85
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

fn default_max_job_concurrency() -> u32 {
    8
}

fn default_visibility_timeout_seconds() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_http_port() -> u16 {
    8080
}

fn default_document_upload_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .prefix("")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        )
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            graph_url: None,
            graph_auth: None,
            openai_api_key: "test-key".into(),
            openai_base_url: default_base_url(),
            embed_provider: default_embed_provider(),
            embed_fallback_provider: None,
            embed_model: default_embed_model(),
            embed_dim: default_embed_dim(),
            embed_batch_size: default_embed_batch_size(),
            embed_max_tokens_per_request: default_embed_max_tokens_per_request(),
            embed_rate_limit_qps: None,
            rerank_provider: None,
            rerank_model: None,
            entity_merge_threshold: default_entity_merge_threshold(),
            storage: StorageKind::Memory,
            blob_bucket: None,
            blob_credentials: None,
            data_dir: default_data_dir(),
            cache_url: None,
            cache_token: None,
            max_job_concurrency: default_max_job_concurrency(),
            visibility_timeout_seconds: default_visibility_timeout_seconds(),
            max_retries: default_max_retries(),
            daily_cost_alert_usd: None,
            error_rate_alert_pct: None,
            feature: HashMap::new(),
            http_port: 0,
            document_upload_max_body_bytes: default_document_upload_max_body_bytes(),
            internal_webhook_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.embed_dim, 1536);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.storage, StorageKind::Memory);
    }
}
