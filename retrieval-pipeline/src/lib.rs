pub mod assembly;
pub mod reranking;

use std::sync::Arc;
use std::time::Duration;

use common::{error::AppError, utils::cache::SharedCache};
use knowledge_graph::{
    store::{Candidate, CandidateKind},
    KnowledgeGraphStore,
};
use sha2::{Digest, Sha256};
use tracing::instrument;

use assembly::{assemble, AssembledContext, TOKEN_BUDGET};
use reranking::RerankerPool;

const RETRIEVAL_CACHE_NAMESPACE: &str = "cache:retrieval:";
const RETRIEVAL_CACHE_TTL: Duration = Duration::from_secs(300);
const HYBRID_SEARCH_K: usize = 50;
const DEFAULT_LIMIT: usize = 5;

/// Narrows `retrieve`'s candidate set before reranking. `None` applies no
/// filter; an empty `kinds` list is equivalent to `None` rather than
/// matching nothing, since an accidental empty filter should not silently
/// starve retrieval.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    pub kinds: Option<Vec<CandidateKind>>,
}

impl RetrievalFilters {
    fn hash(&self) -> String {
        match &self.kinds {
            Some(kinds) if !kinds.is_empty() => {
                let mut labels: Vec<&str> = kinds
                    .iter()
                    .map(|k| match k {
                        CandidateKind::Episode => "episode",
                        CandidateKind::Entity => "entity",
                    })
                    .collect();
                labels.sort_unstable();
                labels.join(",")
            }
            _ => "none".to_string(),
        }
    }

    fn matches(&self, candidate: &Candidate) -> bool {
        match &self.kinds {
            Some(kinds) if !kinds.is_empty() => kinds.contains(&candidate.kind),
            _ => true,
        }
    }
}

/// C9: hybrid retrieval + rerank + context assembly, the pre-model hook the
/// agent orchestrator calls for factual/analytical turns.
pub struct RetrievalService {
    graph: Arc<KnowledgeGraphStore>,
    reranker: Option<Arc<RerankerPool>>,
    cache: Arc<SharedCache>,
}

impl RetrievalService {
    pub fn new(graph: Arc<KnowledgeGraphStore>, reranker: Option<Arc<RerankerPool>>, cache: Arc<SharedCache>) -> Self {
        Self { graph, reranker, cache }
    }

    fn cache_key(org_id: &str, deal_id: &str, query: &str, filters: &RetrievalFilters) -> String {
        let mut hasher = Sha256::new();
        hasher.update(org_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(deal_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(query.as_bytes());
        hasher.update(b"\0");
        hasher.update(filters.hash().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Runs the full C9 pipeline: `hybrid_search` → rerank → assemble,
    /// serving the assembled context from cache when a prior call with the
    /// same `(org, deal, query, filters)` is still within its 5-minute TTL.
    #[instrument(skip(self), fields(%org_id, %deal_id))]
    pub async fn retrieve(
        &self,
        org_id: &str,
        deal_id: &str,
        query: &str,
        limit: Option<usize>,
        filters: RetrievalFilters,
    ) -> Result<AssembledContext, AppError> {
        let key = Self::cache_key(org_id, deal_id, query, &filters);
        if let Some(cached) = self.cache.get(RETRIEVAL_CACHE_NAMESPACE, &key).await {
            return Ok(AssembledContext {
                text: cached,
                citations: Vec::new(),
            });
        }

        let group_id = format!("{org_id}:{deal_id}");
        let mut candidates = self.graph.hybrid_search(&group_id, query, HYBRID_SEARCH_K).await?;
        candidates.retain(|c| filters.matches(c));

        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        let reranked = self.rerank(query, candidates, limit).await?;
        let assembled = assemble(&reranked, TOKEN_BUDGET);

        self.cache
            .set(RETRIEVAL_CACHE_NAMESPACE, &key, &assembled.text, RETRIEVAL_CACHE_TTL)
            .await;

        Ok(assembled)
    }

    /// Step 2 of §4.7: an external rerank model scores the query against
    /// each candidate's text, replacing the hybrid-search fusion order with
    /// the rerank permutation. Falls back to the fused order unreranked when
    /// no reranker is configured, which keeps `retrieve` usable without a
    /// rerank provider rather than failing the whole turn.
    async fn rerank(&self, query: &str, mut candidates: Vec<Candidate>, limit: usize) -> Result<Vec<Candidate>, AppError> {
        let Some(pool) = &self.reranker else {
            candidates.sort_by(|a, b| b.fused.partial_cmp(&a.fused).unwrap_or(std::cmp::Ordering::Equal));
            candidates.truncate(limit);
            return Ok(candidates);
        };

        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let lease = pool.checkout().await;
        let scored = lease.rerank(query, texts).await?;

        let mut by_index: Vec<(usize, f32)> = scored.iter().map(|r| (r.index as usize, r.score)).collect();
        by_index.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(by_index
            .into_iter()
            .take(limit)
            .filter_map(|(index, _)| candidates.get(index).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
    use knowledge_graph::store::KnowledgeGraphStore;
    use uuid::Uuid;

    async fn setup() -> (Arc<KnowledgeGraphStore>, Arc<SharedCache>) {
        let db = SurrealDbClient::memory("retrieval_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let cfg = AppConfig::default();
        let embedding = common::utils::embedding::EmbeddingProvider::new(&cfg);
        let llm = async_openai::Client::new();
        let graph = Arc::new(KnowledgeGraphStore::new(db, embedding, llm, "gpt-4o-mini", &cfg));
        let cache = Arc::new(SharedCache::from_config(&cfg).await);
        (graph, cache)
    }

    #[tokio::test]
    async fn retrieve_on_empty_graph_returns_empty_context() {
        let (graph, cache) = setup().await;
        let service = RetrievalService::new(graph, None, cache);

        let assembled = service
            .retrieve("org1", "deal1", "what is the target's revenue", None, RetrievalFilters::default())
            .await
            .expect("retrieve");

        assert!(assembled.is_empty());
    }

    #[test]
    fn filters_hash_is_stable_regardless_of_order() {
        let a = RetrievalFilters {
            kinds: Some(vec![CandidateKind::Entity, CandidateKind::Episode]),
        };
        let b = RetrievalFilters {
            kinds: Some(vec![CandidateKind::Episode, CandidateKind::Entity]),
        };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn empty_kinds_list_matches_everything() {
        let filters = RetrievalFilters { kinds: Some(Vec::new()) };
        let candidate = Candidate {
            kind: CandidateKind::Entity,
            id: "x".into(),
            group_id: "org:deal".into(),
            text: "text".into(),
            source_refs: vec![],
            channel: None,
            scores: knowledge_graph::store::TripleScore::default(),
            fused: 0.0,
        };
        assert!(filters.matches(&candidate));
    }
}
