use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::available_parallelism,
};

use common::{error::AppError, utils::config::AppConfig};
use fastembed::{RerankInitOptions, RerankResult, TextRerank};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

static NEXT_ENGINE: AtomicUsize = AtomicUsize::new(0);

fn pick_engine_index(pool_len: usize) -> usize {
    let n = NEXT_ENGINE.fetch_add(1, Ordering::Relaxed);
    n % pool_len
}

/// Step 2 of C9's pipeline: a pool of local cross-encoder reranking engines
/// standing in for the pluggable external rerank provider (`rerank_provider`/
/// `rerank_model` on `AppConfig` name the provider; the engine itself is the
/// adapter). Pool size bounds how many reranks run concurrently.
pub struct RerankerPool {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
}

impl RerankerPool {
    fn new_with_options(pool_size: usize, init_options: RerankInitOptions) -> Result<Arc<Self>, AppError> {
        if pool_size == 0 {
            return Err(AppError::Validation(
                "reranker pool size must be greater than zero".to_string(),
            ));
        }

        fs::create_dir_all(&init_options.cache_dir)?;

        let mut engines = Vec::with_capacity(pool_size);
        for index in 0..pool_size {
            debug!("creating reranking engine {index}");
            let model = TextRerank::try_new(init_options.clone())
                .map_err(|e| AppError::Internal(e.to_string()))?;
            engines.push(Arc::new(Mutex::new(model)));
        }

        Ok(Arc::new(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }))
    }

    /// Builds a pool from `AppConfig` if a rerank provider is configured;
    /// `None` means C9 skips reranking and keeps the fused hybrid-search
    /// order (a degraded-but-functional fallback, not an error).
    pub fn maybe_from_config(cfg: &AppConfig) -> Result<Option<Arc<Self>>, AppError> {
        if cfg.rerank_provider.is_none() {
            return Ok(None);
        }

        let pool_size = available_parallelism().map(|v| v.get().min(2)).unwrap_or(2).max(1);
        let mut init_options = RerankInitOptions::default();
        init_options.cache_dir = Path::new(&cfg.data_dir).join("fastembed").join("reranker");
        Self::new_with_options(pool_size, init_options).map(Some)
    }

    pub async fn checkout(self: &Arc<Self>) -> RerankerLease {
        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore closed");
        let idx = pick_engine_index(self.engines.len());
        RerankerLease {
            _permit: permit,
            engine: self.engines[idx].clone(),
        }
    }
}

/// Active lease on a single `TextRerank` instance; releases its pool slot on drop.
pub struct RerankerLease {
    _permit: OwnedSemaphorePermit,
    engine: Arc<Mutex<TextRerank>>,
}

impl RerankerLease {
    pub async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<RerankResult>, AppError> {
        let mut guard = self.engine.lock().await;
        guard
            .rerank(query.to_owned(), documents, false, None)
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}
