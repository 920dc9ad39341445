use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, warn};

use crate::{error::AppError, storage::types::llm_usage::LlmUsage, utils::config::AppConfig};

/// Batched, fallback-aware embedding client for C6.
///
/// Every request is chunked to `batch_size` inputs, retried on the primary
/// provider with exponential backoff + jitter, and handed to the fallback
/// provider for the remainder of the batch once the primary's retry budget
/// is exhausted.
pub struct EmbeddingProvider {
    primary: Client<OpenAIConfig>,
    fallback: Option<Client<OpenAIConfig>>,
    model: String,
    dimensions: u32,
    batch_size: usize,
    max_retries: usize,
}

const MAX_PRIMARY_RETRIES: usize = 3;

impl EmbeddingProvider {
    pub fn new(cfg: &AppConfig) -> Self {
        let primary = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(cfg.openai_api_key.clone())
                .with_api_base(cfg.openai_base_url.clone()),
        );
        let fallback = cfg
            .embed_fallback_provider
            .as_ref()
            .map(|_| Client::with_config(OpenAIConfig::new().with_api_key(cfg.openai_api_key.clone())));

        Self {
            primary,
            fallback,
            model: cfg.embed_model.clone(),
            dimensions: cfg.embed_dim,
            batch_size: cfg.embed_batch_size,
            max_retries: MAX_PRIMARY_RETRIES,
        }
    }

    pub fn dimension(&self) -> u32 {
        self.dimensions
    }

    /// Embed a single string; convenience wrapper over `embed_batch`.
    pub async fn embed(&self, input: &str, org_id: &str, db: &crate::storage::db::SurrealDbClient) -> Result<Vec<f32>, AppError> {
        let mut vectors = self.embed_batch(&[input.to_string()], org_id, db).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::ProviderContract("embedding response was empty".to_string()))
    }

    /// Embed many strings, chunked to `batch_size` requests, logging an
    /// `LlmUsage` row per underlying provider call.
    pub async fn embed_batch(
        &self,
        inputs: &[String],
        org_id: &str,
        db: &crate::storage::db::SurrealDbClient,
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let mut results = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(self.batch_size.max(1)) {
            let vectors = self.embed_chunk(chunk, org_id, db).await?;
            results.extend(vectors);
        }
        Ok(results)
    }

    async fn embed_chunk(
        &self,
        chunk: &[String],
        org_id: &str,
        db: &crate::storage::db::SurrealDbClient,
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let started = std::time::Instant::now();
        let strategy = ExponentialBackoff::from_millis(200).map(jitter).take(self.max_retries);

        let primary_result = Retry::spawn(strategy, || self.request_embeddings(&self.primary, chunk)).await;

        let (vectors, provider_label, status) = match primary_result {
            Ok(vectors) => (vectors, "openai", "success"),
            Err(primary_err) => {
                warn!("primary embedding provider exhausted retries: {primary_err}");
                match &self.fallback {
                    Some(fallback) => {
                        let vectors = self.request_embeddings(fallback, chunk).await.map_err(|e| {
                            AppError::ProviderUnavailable(format!(
                                "primary and fallback embedding providers both failed: {e}"
                            ))
                        })?;
                        (vectors, "fallback", "success")
                    }
                    None => return Err(primary_err),
                }
            }
        };

        let mut usage = LlmUsage::new(
            org_id.to_string(),
            None,
            "system".to_string(),
            provider_label.to_string(),
            self.model.clone(),
            "embedding".to_string(),
            0,
            0,
            0.0,
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );
        usage.status = status.to_string();
        let _ = usage.record(db).await;

        Ok(vectors)
    }

    async fn request_embeddings(
        &self,
        client: &Client<OpenAIConfig>,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .dimensions(self.dimensions)
            .input(inputs.to_vec())
            .build()?;

        let response = client.embeddings().create(request).await?;
        debug!("embedded {} inputs at {} dimensions", inputs.len(), self.dimensions);

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
