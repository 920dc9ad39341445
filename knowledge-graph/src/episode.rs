use common::{error::AppError, storage::db::SurrealDbClient, stored_object};
use sha2::{Digest, Sha256};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq, Eq, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SourceChannel {
    Document,
    QaResponse,
    AnalystChat,
    MeetingNote,
}

stored_object!(Episode, "episode", {
    group_id: String,
    source_channel: SourceChannel,
    body: String,
    reference_time: DateTime<Utc>,
    source_description: String,
    provenance: Option<String>,
    embedding: Vec<f32>,
    content_hash: String
});

/// Content hash used for idempotent `add_episode` calls: same group, body and
/// reference time resolve to the same episode instead of duplicating it.
pub fn content_hash(group_id: &str, body: &str, reference_time: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(group_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(body.as_bytes());
    hasher.update(b"\0");
    hasher.update(reference_time.to_rfc3339().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Episode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: String,
        body: String,
        source_channel: SourceChannel,
        reference_time: DateTime<Utc>,
        source_description: String,
        provenance: Option<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        let hash = content_hash(&group_id, &body, &reference_time);
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            group_id,
            source_channel,
            body,
            reference_time,
            source_description,
            provenance,
            embedding,
            content_hash: hash,
        }
    }

    /// Top-K vector neighbors within the same `group_id`, used by
    /// `hybrid_search`'s episode leg.
    pub async fn vector_candidates(
        group_id: &str,
        embedding: &[f32],
        k: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<(Self, f32)>, AppError> {
        #[derive(Deserialize)]
        struct ScoreRow {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
            score: f32,
        }

        let sql = format!(
            r"SELECT id, vector::similarity::cosine(embedding, $embedding) AS score
               FROM episode
               WHERE group_id = $group_id
                 AND embedding <|{k},100|> $embedding
               ORDER BY score DESC
               LIMIT {k};"
        );

        let score_rows: Vec<ScoreRow> = db
            .client
            .query(sql)
            .bind(("group_id", group_id.to_string()))
            .bind(("embedding", embedding.to_vec()))
            .await?
            .take(0)?;

        if score_rows.is_empty() {
            return Ok(Vec::new());
        }

        let thing_ids: Vec<surrealdb::sql::Thing> = score_rows
            .iter()
            .map(|row| surrealdb::sql::Thing::from(("episode", row.id.as_str())))
            .collect();

        let episodes: Vec<Self> = db
            .client
            .query("SELECT * FROM episode WHERE id IN $ids AND group_id = $group_id")
            .bind(("ids", thing_ids))
            .bind(("group_id", group_id.to_string()))
            .await?
            .take(0)?;

        let mut by_id: std::collections::HashMap<String, Self> = episodes
            .into_iter()
            .map(|episode| (episode.id.clone(), episode))
            .collect();

        Ok(score_rows
            .into_iter()
            .filter_map(|row| by_id.remove(&row.id).map(|episode| (episode, row.score)))
            .collect())
    }

    /// BM25 full-text match over episode bodies within a group.
    pub async fn fts_candidates(
        group_id: &str,
        query: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<(Self, f32)>, AppError> {
        #[derive(Deserialize)]
        struct ScoreRow {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
            score: Option<f32>,
        }

        let sql = format!(
            r"SELECT id, search::score(0) AS score FROM episode
               WHERE group_id = $group_id AND body @0@ $query
               ORDER BY score DESC
               LIMIT {limit};"
        );

        let score_rows: Vec<ScoreRow> = db
            .client
            .query(sql)
            .bind(("group_id", group_id.to_string()))
            .bind(("query", query.to_string()))
            .await?
            .take(0)?;

        if score_rows.is_empty() {
            return Ok(Vec::new());
        }

        let thing_ids: Vec<surrealdb::sql::Thing> = score_rows
            .iter()
            .map(|row| surrealdb::sql::Thing::from(("episode", row.id.as_str())))
            .collect();

        let episodes: Vec<Self> = db
            .client
            .query("SELECT * FROM episode WHERE id IN $ids AND group_id = $group_id")
            .bind(("ids", thing_ids))
            .bind(("group_id", group_id.to_string()))
            .await?
            .take(0)?;

        let mut by_id: std::collections::HashMap<String, Self> = episodes
            .into_iter()
            .map(|episode| (episode.id.clone(), episode))
            .collect();

        Ok(score_rows
            .into_iter()
            .filter_map(|row| {
                by_id
                    .remove(&row.id)
                    .map(|episode| (episode, row.score.unwrap_or_default()))
            })
            .collect())
    }

    pub async fn find_by_content_hash(
        group_id: &str,
        hash: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut rows: Vec<Self> = db
            .client
            .query("SELECT * FROM episode WHERE group_id = $group_id AND content_hash = $hash LIMIT 1")
            .bind(("group_id", group_id.to_string()))
            .bind(("hash", hash.to_string()))
            .await?
            .take(0)?;
        Ok(rows.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid as TestUuid;

    #[test]
    fn content_hash_is_stable_for_identical_input() {
        let t = Utc::now();
        let a = content_hash("org:deal", "revenue grew 12%", &t);
        let b = content_hash("org:deal", "revenue grew 12%", &t);
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_differs_on_group() {
        let t = Utc::now();
        let a = content_hash("org:deal-1", "revenue grew 12%", &t);
        let b = content_hash("org:deal-2", "revenue grew 12%", &t);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn find_by_content_hash_roundtrips() {
        let db = SurrealDbClient::memory("episode_ns", &TestUuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let episode = Episode::new(
            "org1:deal1".into(),
            "the target signed a new supplier agreement".into(),
            SourceChannel::Document,
            Utc::now(),
            "10-K.pdf p.12".into(),
            None,
            vec![0.1, 0.2, 0.3],
        );
        let hash = episode.content_hash.clone();
        db.store_item(episode.clone()).await.expect("store episode");

        let found = Episode::find_by_content_hash("org1:deal1", &hash, &db)
            .await
            .expect("query")
            .expect("episode found");
        assert_eq!(found.id, episode.id);
    }
}
