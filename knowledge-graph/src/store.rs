use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_openai::{config::OpenAIConfig, Client};
use chrono::{DateTime, Utc};
use common::{
    error::AppError, storage::db::SurrealDbClient, utils::config::AppConfig,
    utils::embedding::EmbeddingProvider,
};

use crate::entity::Entity;
use crate::episode::{content_hash, Episode, SourceChannel};
use crate::extraction::{self, ExtractedEntity};
use crate::fact_edge::{
    base_confidence_for_channel, FactEdge, FactLabel, CONTRADICTION_DERIVED_CONFIDENCE,
};

const RESOLUTION_CANDIDATE_K: usize = 5;
const VECTOR_WEIGHT: f32 = 0.5;
const BM25_WEIGHT: f32 = 0.3;
const GRAPH_WEIGHT: f32 = 0.2;

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn normalize_relation(relation: &str) -> String {
    normalize(relation).replace(' ', "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Episode,
    Entity,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TripleScore {
    pub vector: Option<f32>,
    pub bm25: Option<f32>,
    pub graph: Option<f32>,
}

/// A hybrid-search hit carrying its per-signal scores and provenance,
/// per §4.5's `CandidateList` contract.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub id: String,
    pub group_id: String,
    pub text: String,
    pub source_refs: Vec<String>,
    /// The episode's source channel, serialized `snake_case` (e.g.
    /// `"qa_response"`), carried for C9's citation formatting. `None` for
    /// entity candidates, which have no single originating channel.
    pub channel: Option<String>,
    pub scores: TripleScore,
    pub fused: f32,
}

impl Candidate {
    fn from_episode(episode: &Episode) -> Self {
        let channel = serde_json::to_value(episode.source_channel)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string));
        Self {
            kind: CandidateKind::Episode,
            id: episode.id.clone(),
            group_id: episode.group_id.clone(),
            text: episode.body.clone(),
            source_refs: vec![episode.source_description.clone()],
            channel,
            scores: TripleScore::default(),
            fused: 0.0,
        }
    }

    fn from_entity(entity: &Entity) -> Self {
        Self {
            kind: CandidateKind::Entity,
            id: entity.id.clone(),
            group_id: entity.group_id.clone(),
            text: entity.summary.clone(),
            source_refs: vec![entity.canonical_name.clone()],
            channel: None,
            scores: TripleScore::default(),
            fused: 0.0,
        }
    }
}

fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for s in scores {
        if s.is_finite() {
            min = min.min(*s);
            max = max.max(*s);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        return vec![0.0; scores.len()];
    }
    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores
        .iter()
        .map(|s| if s.is_finite() { (s - min) / (max - min) } else { 0.0 })
        .collect()
}

/// Entry point for C7: the temporal knowledge graph. One instance per
/// process; internally stateless beyond its storage/LLM clients, so
/// `add_episode` calls are safe to run concurrently across `group_id`s.
pub struct KnowledgeGraphStore {
    db: SurrealDbClient,
    embedding: EmbeddingProvider,
    llm: Client<OpenAIConfig>,
    extraction_model: String,
    entity_merge_threshold: f32,
}

impl KnowledgeGraphStore {
    pub fn new(
        db: SurrealDbClient,
        embedding: EmbeddingProvider,
        llm: Client<OpenAIConfig>,
        extraction_model: impl Into<String>,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            db,
            embedding,
            llm,
            extraction_model: extraction_model.into(),
            entity_merge_threshold: cfg.entity_merge_threshold as f32,
        }
    }

    fn org_id_of(group_id: &str) -> String {
        group_id.split(':').next().unwrap_or(group_id).to_string()
    }

    /// Embeds and LLM-extracts entities/facts from `body`, resolves entities
    /// against the existing graph, and emits `FactEdge`s. Idempotent by
    /// `(group_id, body, reference_time)` content hash.
    #[tracing::instrument(skip(self, body, provenance), fields(org_id = %Self::org_id_of(group_id)))]
    pub async fn add_episode(
        &self,
        group_id: &str,
        body: &str,
        source_channel: SourceChannel,
        reference_time: DateTime<Utc>,
        source_description: &str,
        provenance: Option<String>,
    ) -> Result<String, AppError> {
        let org_id = Self::org_id_of(group_id);
        let hash = content_hash(group_id, body, &reference_time);
        if let Some(existing) = Episode::find_by_content_hash(group_id, &hash, &self.db).await? {
            tracing::debug!(episode_id = %existing.id, "add_episode short-circuited on content hash");
            return Ok(existing.id);
        }

        let body_embedding = self.embedding.embed(body, &org_id, &self.db).await?;
        let episode = Episode::new(
            group_id.to_string(),
            body.to_string(),
            source_channel,
            reference_time,
            source_description.to_string(),
            provenance,
            body_embedding,
        );
        self.db.store_item(episode.clone()).await?;

        let extracted = extraction::extract(&self.llm, &self.extraction_model, body).await?;
        let resolved = self
            .resolve_entities(group_id, &org_id, &extracted.entities)
            .await?;

        for fact in &extracted.facts {
            let (Some(subject_id), Some(object_id)) = (
                resolved.get(&normalize(&fact.subject)),
                resolved.get(&normalize(&fact.object)),
            ) else {
                continue;
            };
            self.upsert_fact(
                group_id,
                subject_id,
                &normalize_relation(&fact.relation),
                object_id,
                fact.period.as_deref(),
                source_channel,
                &episode.id,
            )
            .await?;
        }

        tracing::info!(episode_id = %episode.id, entity_count = extracted.entities.len(), fact_count = extracted.facts.len(), "episode ingested");
        Ok(episode.id)
    }

    async fn resolve_entities(
        &self,
        group_id: &str,
        org_id: &str,
        candidates: &[ExtractedEntity],
    ) -> Result<HashMap<String, String>, AppError> {
        let mut resolved = HashMap::new();
        if candidates.is_empty() {
            return Ok(resolved);
        }

        let texts: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}: {}", c.name, c.summary))
            .collect();
        let embeddings = self.embedding.embed_batch(&texts, org_id, &self.db).await?;

        for (candidate, embedding) in candidates.iter().zip(embeddings) {
            let key = normalize(&candidate.name);
            if resolved.contains_key(&key) {
                continue;
            }

            if let Some(exact) =
                Entity::find_by_name_or_alias(group_id, &candidate.name, &self.db).await?
            {
                resolved.insert(key, exact.id);
                continue;
            }

            let vector_hits =
                Entity::vector_candidates(group_id, &embedding, RESOLUTION_CANDIDATE_K, &self.db)
                    .await?;
            let best_vector = vector_hits
                .into_iter()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
            if let Some((best, score)) = best_vector {
                if score >= self.entity_merge_threshold {
                    let mut merged = best;
                    merged.add_alias(candidate.name.clone());
                    let merged = merged.save(&self.db).await?;
                    resolved.insert(key, merged.id);
                    continue;
                }
            }

            let fts_hits = Entity::fts_candidates(group_id, &candidate.name, 1, &self.db).await?;
            if let Some(mut fts_match) = fts_hits
                .into_iter()
                .find(|e| normalize(&e.canonical_name) == key)
            {
                fts_match.add_alias(candidate.name.clone());
                let merged = fts_match.save(&self.db).await?;
                resolved.insert(key, merged.id);
                continue;
            }

            let new_entity = Entity::new(
                group_id.to_string(),
                candidate.name.clone(),
                candidate.aliases.clone(),
                candidate.to_entity_type(),
                candidate.summary.clone(),
                embedding,
            );
            self.db.store_item(new_entity.clone()).await?;
            resolved.insert(key, new_entity.id);
        }

        Ok(resolved)
    }

    /// Creates a `FactEdge` unless an identical one is already active
    /// (idempotent restatement), and supersedes any active edge that shares
    /// `(subject, relation, period)` but asserts a different object.
    async fn upsert_fact(
        &self,
        group_id: &str,
        subject_id: &str,
        relation: &str,
        object_id: &str,
        period: Option<&str>,
        source_channel: SourceChannel,
        episode_id: &str,
    ) -> Result<(), AppError> {
        if FactEdge::find_active_by_signature(group_id, subject_id, relation, object_id, period, &self.db)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let conflicting: Vec<FactEdge> = FactEdge::find_active_by_subject_relation_period(
            group_id, subject_id, relation, period, &self.db,
        )
        .await?
        .into_iter()
        .filter(|e| e.object_id != object_id)
        .collect();

        let (confidence, labels) = if conflicting.is_empty() {
            (
                base_confidence_for_channel(source_channel),
                vec![FactLabel::ExtractedFrom],
            )
        } else {
            (
                CONTRADICTION_DERIVED_CONFIDENCE,
                vec![
                    FactLabel::ExtractedFrom,
                    FactLabel::Contradicts,
                    FactLabel::Supersedes,
                ],
            )
        };

        let mut new_edge = FactEdge::new(
            group_id.to_string(),
            subject_id.to_string(),
            relation.to_string(),
            object_id.to_string(),
            period.map(ToString::to_string),
            confidence,
            episode_id.to_string(),
            labels,
        );
        if let Some(old) = conflicting.first() {
            new_edge.supersedes = Some(old.id.clone());
        }
        self.db.store_item(new_edge.clone()).await?;

        for old in &conflicting {
            FactEdge::mark_superseded_by(&old.id, &new_edge.id, &self.db).await?;
        }
        if !conflicting.is_empty() {
            tracing::info!(new_edge_id = %new_edge.id, superseded = conflicting.len(), "fact edge supersession");
        }

        Ok(())
    }

    pub async fn get_entity(
        &self,
        group_id: &str,
        canonical_name: &str,
    ) -> Result<Option<Entity>, AppError> {
        Entity::find_by_name_or_alias(group_id, canonical_name, &self.db).await
    }

    pub async fn invalidate_edge(&self, id: &str) -> Result<(), AppError> {
        self.db
            .client
            .query("UPDATE type::thing('fact_edge', $id) SET invalid_at = time::now()")
            .bind(("id", id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    /// Folds `loser` into `winner`: aliases are merged, the loser's active
    /// edges are repointed onto the winner via fresh superseding edges
    /// (edges stay immutable, invariant 5), and the loser row is deleted.
    #[tracing::instrument(skip(self))]
    pub async fn merge_entities(
        &self,
        group_id: &str,
        winner_id: &str,
        loser_id: &str,
    ) -> Result<Entity, AppError> {
        let winner: Entity = self
            .db
            .get_item(winner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity {winner_id} not found")))?;
        let loser: Entity = self
            .db
            .get_item(loser_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("entity {loser_id} not found")))?;
        if winner.group_id != group_id || loser.group_id != group_id {
            return Err(AppError::Validation(
                "entities must share the same group_id to merge".into(),
            ));
        }

        let mut merged = winner;
        merged.add_alias(loser.canonical_name.clone());
        for alias in &loser.aliases {
            merged.add_alias(alias.clone());
        }
        let merged = merged.save(&self.db).await?;

        for edge in FactEdge::list_active_for_entity(group_id, &loser.id, &self.db).await? {
            let (subject_id, object_id) = if edge.subject_id == loser.id {
                (merged.id.clone(), edge.object_id.clone())
            } else {
                (edge.subject_id.clone(), merged.id.clone())
            };
            let mut repointed = FactEdge::new(
                group_id.to_string(),
                subject_id,
                edge.relation.clone(),
                object_id,
                edge.period.clone(),
                edge.confidence,
                edge.provenance_episode_id.clone(),
                edge.labels.clone(),
            );
            repointed.supersedes = Some(edge.id.clone());
            self.db.store_item(repointed.clone()).await?;
            FactEdge::mark_superseded_by(&edge.id, &repointed.id, &self.db).await?;
        }

        self.db.delete_item::<Entity>(&loser.id).await?;
        Ok(merged)
    }

    /// Parallel vector + BM25 + shallow graph-walk retrieval, merged and
    /// deduplicated into a single triple-scored candidate list.
    #[tracing::instrument(skip(self, query), fields(org_id = %Self::org_id_of(group_id)))]
    pub async fn hybrid_search(
        &self,
        group_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        let org_id = Self::org_id_of(group_id);
        let query_embedding = self.embedding.embed(query, &org_id, &self.db).await?;

        let (episode_vec, entity_vec, episode_fts, entity_fts) = tokio::try_join!(
            Episode::vector_candidates(group_id, &query_embedding, k, &self.db),
            Entity::vector_candidates(group_id, &query_embedding, k, &self.db),
            Episode::fts_candidates(group_id, query, k, &self.db),
            Entity::fts_candidates_scored(group_id, query, k, &self.db),
        )?;

        let mut merged: HashMap<String, Candidate> = HashMap::new();

        for (episode, score) in &episode_vec {
            let key = format!("episode:{}", episode.id);
            let entry = merged
                .entry(key)
                .or_insert_with(|| Candidate::from_episode(episode));
            entry.scores.vector = Some(*score);
        }
        for (episode, score) in &episode_fts {
            let key = format!("episode:{}", episode.id);
            let entry = merged
                .entry(key)
                .or_insert_with(|| Candidate::from_episode(episode));
            entry.scores.bm25 = Some(*score);
        }
        for (entity, score) in &entity_vec {
            let key = format!("entity:{}", entity.id);
            let entry = merged
                .entry(key)
                .or_insert_with(|| Candidate::from_entity(entity));
            entry.scores.vector = Some(*score);
        }
        for (entity, score) in &entity_fts {
            let key = format!("entity:{}", entity.id);
            let entry = merged
                .entry(key)
                .or_insert_with(|| Candidate::from_entity(entity));
            entry.scores.bm25 = Some(*score);
        }

        let seed_ids: HashSet<String> = entity_vec
            .iter()
            .map(|(e, _)| e.id.clone())
            .chain(entity_fts.iter().map(|(e, _)| e.id.clone()))
            .collect();

        for seed_id in &seed_ids {
            let edges = FactEdge::list_active_for_entity(group_id, seed_id, &self.db).await?;
            for edge in edges {
                let neighbor_id = if edge.subject_id == *seed_id {
                    edge.object_id.clone()
                } else {
                    edge.subject_id.clone()
                };
                if neighbor_id == *seed_id {
                    continue;
                }
                let graph_score = edge.confidence as f32;
                let key = format!("entity:{neighbor_id}");
                if let Some(entry) = merged.get_mut(&key) {
                    entry.scores.graph =
                        Some(entry.scores.graph.map_or(graph_score, |g| g.max(graph_score)));
                } else if let Some(neighbor) = self.db.get_item::<Entity>(&neighbor_id).await? {
                    let mut candidate = Candidate::from_entity(&neighbor);
                    candidate.scores.graph = Some(graph_score);
                    merged.insert(key, candidate);
                }
            }
        }

        let mut candidates: Vec<Candidate> = merged.into_values().collect();
        let vector_norm = min_max_normalize(
            &candidates
                .iter()
                .map(|c| c.scores.vector.unwrap_or(0.0))
                .collect::<Vec<_>>(),
        );
        let bm25_norm = min_max_normalize(
            &candidates
                .iter()
                .map(|c| c.scores.bm25.unwrap_or(0.0))
                .collect::<Vec<_>>(),
        );
        let graph_norm = min_max_normalize(
            &candidates
                .iter()
                .map(|c| c.scores.graph.unwrap_or(0.0))
                .collect::<Vec<_>>(),
        );

        for ((candidate, v), (b, g)) in candidates
            .iter_mut()
            .zip(vector_norm)
            .zip(bm25_norm.into_iter().zip(graph_norm))
        {
            let v = if candidate.scores.vector.is_some() { v } else { 0.0 };
            let b = if candidate.scores.bm25.is_some() { b } else { 0.0 };
            let g = if candidate.scores.graph.is_some() { g } else { 0.0 };
            candidate.fused = v.mul_add(VECTOR_WEIGHT, b.mul_add(BM25_WEIGHT, g * GRAPH_WEIGHT));
        }

        candidates.sort_by(|a, b| {
            b.fused
                .partial_cmp(&a.fused)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(k);

        tracing::debug!(candidate_count = candidates.len(), "hybrid_search fused candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CompanyRole, EntityType};
    use common::utils::config::AppConfig;
    use uuid::Uuid;

    fn test_store(db: SurrealDbClient) -> KnowledgeGraphStore {
        let cfg = AppConfig::default();
        KnowledgeGraphStore::new(
            db,
            EmbeddingProvider::new(&cfg),
            Client::new(),
            "gpt-4o-mini".to_string(),
            &cfg,
        )
    }

    async fn setup_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("kg_store_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    fn sample_entity(group_id: &str, name: &str) -> Entity {
        Entity::new(
            group_id.to_string(),
            name.to_string(),
            vec![],
            EntityType::Company {
                role: CompanyRole::Target,
            },
            "sample".to_string(),
            vec![0.1, 0.2, 0.3],
        )
    }

    #[tokio::test]
    async fn upsert_fact_creates_new_edge_without_conflict() {
        let db = setup_db().await;
        let store = test_store(db.clone());

        let subject = sample_entity("org1:deal1", "Acme Corp");
        let object = sample_entity("org1:deal1", "Globex");
        db.store_item(subject.clone()).await.expect("store subject");
        db.store_item(object.clone()).await.expect("store object");

        store
            .upsert_fact(
                "org1:deal1",
                &subject.id,
                "acquired",
                &object.id,
                Some("2024".into()),
                SourceChannel::Document,
                "episode_1",
            )
            .await
            .expect("upsert fact");

        let edges = FactEdge::list_active_for_entity("org1:deal1", &subject.id, &db)
            .await
            .expect("list edges");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].confidence, base_confidence_for_channel(SourceChannel::Document));
        assert!(edges[0].labels.contains(&FactLabel::ExtractedFrom));
    }

    #[tokio::test]
    async fn upsert_fact_is_idempotent_on_identical_restatement() {
        let db = setup_db().await;
        let store = test_store(db.clone());

        let subject = sample_entity("org1:deal1", "Acme Corp");
        let object = sample_entity("org1:deal1", "Globex");
        db.store_item(subject.clone()).await.expect("store subject");
        db.store_item(object.clone()).await.expect("store object");

        for _ in 0..2 {
            store
                .upsert_fact(
                    "org1:deal1",
                    &subject.id,
                    "acquired",
                    &object.id,
                    Some("2024".into()),
                    SourceChannel::Document,
                    "episode_1",
                )
                .await
                .expect("upsert fact");
        }

        let edges = FactEdge::list_active_for_entity("org1:deal1", &subject.id, &db)
            .await
            .expect("list edges");
        assert_eq!(edges.len(), 1, "restating the same fact must not duplicate it");
    }

    #[tokio::test]
    async fn upsert_fact_supersedes_on_conflicting_object() {
        let db = setup_db().await;
        let store = test_store(db.clone());

        let subject = sample_entity("org1:deal1", "Acme Corp");
        let old_ceo = sample_entity("org1:deal1", "Alice");
        let new_ceo = sample_entity("org1:deal1", "Bob");
        db.store_item(subject.clone()).await.expect("store subject");
        db.store_item(old_ceo.clone()).await.expect("store old ceo");
        db.store_item(new_ceo.clone()).await.expect("store new ceo");

        store
            .upsert_fact(
                "org1:deal1",
                &subject.id,
                "ceo_is",
                &old_ceo.id,
                None,
                SourceChannel::Document,
                "episode_1",
            )
            .await
            .expect("first assertion");

        store
            .upsert_fact(
                "org1:deal1",
                &subject.id,
                "ceo_is",
                &new_ceo.id,
                None,
                SourceChannel::AnalystChat,
                "episode_2",
            )
            .await
            .expect("conflicting assertion");

        let edges = FactEdge::list_active_for_entity("org1:deal1", &subject.id, &db)
            .await
            .expect("list edges");
        assert_eq!(edges.len(), 1, "only the superseding edge should remain active");
        assert_eq!(edges[0].object_id, new_ceo.id);
        assert_eq!(edges[0].confidence, CONTRADICTION_DERIVED_CONFIDENCE);
        assert!(edges[0].labels.contains(&FactLabel::Contradicts));
        assert!(edges[0].supersedes.is_some());
    }

    #[tokio::test]
    async fn merge_entities_repoints_edges_and_deletes_loser() {
        let db = setup_db().await;
        let store = test_store(db.clone());

        let winner = sample_entity("org1:deal1", "Acme Corporation");
        let loser = sample_entity("org1:deal1", "Acme Corp");
        let counterparty = sample_entity("org1:deal1", "Globex");
        db.store_item(winner.clone()).await.expect("store winner");
        db.store_item(loser.clone()).await.expect("store loser");
        db.store_item(counterparty.clone())
            .await
            .expect("store counterparty");

        store
            .upsert_fact(
                "org1:deal1",
                &loser.id,
                "acquired",
                &counterparty.id,
                None,
                SourceChannel::Document,
                "episode_1",
            )
            .await
            .expect("seed edge on loser");

        let merged = store
            .merge_entities("org1:deal1", &winner.id, &loser.id)
            .await
            .expect("merge entities");

        assert!(merged.aliases.contains(&loser.canonical_name));
        assert!(db
            .get_item::<Entity>(&loser.id)
            .await
            .expect("lookup loser")
            .is_none());

        let winner_edges = FactEdge::list_active_for_entity("org1:deal1", &winner.id, &db)
            .await
            .expect("list winner edges");
        assert_eq!(winner_edges.len(), 1);
        assert_eq!(winner_edges[0].subject_id, winner.id);
    }

    #[tokio::test]
    async fn invalidate_edge_sets_invalid_at() {
        let db = setup_db().await;
        let store = test_store(db.clone());

        let edge = FactEdge::new(
            "org1:deal1".into(),
            "entity_a".into(),
            "relates_to".into(),
            "entity_b".into(),
            None,
            0.9,
            "episode_1".into(),
            vec![FactLabel::ExtractedFrom],
        );
        db.store_item(edge.clone()).await.expect("store edge");

        store.invalidate_edge(&edge.id).await.expect("invalidate");

        let remaining = FactEdge::list_active_for_entity("org1:deal1", "entity_a", &db)
            .await
            .expect("list edges");
        assert!(remaining.is_empty(), "edge should no longer be active");
    }
}
