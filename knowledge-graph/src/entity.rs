use common::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq, Eq, Copy)]
pub enum CompanyRole {
    Target,
    Acquirer,
    Competitor,
    Customer,
    Supplier,
    Investor,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq, Eq, Copy)]
pub enum PersonRole {
    Executive,
    Advisor,
    Board,
    Investor,
    Employee,
}

/// Open entity type schema: a sell-side spine of well-known node kinds plus
/// an `Other` escape hatch for LLM-discovered types not in the spine.
#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum EntityType {
    Company { role: CompanyRole },
    Person { role: PersonRole },
    Deal,
    Document,
    FinancialMetric {
        metric_type: String,
        value: f64,
        period: String,
        currency: String,
        basis: String,
    },
    Finding,
    Risk { severity: String, category: String },
    Other(String),
}

stored_object!(Entity, "entity", {
    group_id: String,
    canonical_name: String,
    aliases: Vec<String>,
    entity_type: EntityType,
    summary: String,
    embedding: Vec<f32>
});

#[derive(Deserialize, Debug)]
struct VectorScoreRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    score: f32,
}

impl Entity {
    pub fn new(
        group_id: String,
        canonical_name: String,
        aliases: Vec<String>,
        entity_type: EntityType,
        summary: String,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            group_id,
            canonical_name,
            aliases,
            entity_type,
            summary,
            embedding,
        }
    }

    /// Top-K vector neighbors within the same `group_id`, used by entity
    /// resolution during `add_episode`.
    pub async fn vector_candidates(
        group_id: &str,
        embedding: &[f32],
        k: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<(Self, f32)>, AppError> {
        let sql = format!(
            r"SELECT id, vector::similarity::cosine(embedding, $embedding) AS score
               FROM entity
               WHERE group_id = $group_id
                 AND embedding <|{k},100|> $embedding
               ORDER BY score DESC
               LIMIT {k};"
        );

        let score_rows: Vec<VectorScoreRow> = db
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
            .map(|row| surrealdb::sql::Thing::from(("entity", row.id.as_str())))
            .collect();

        let entities: Vec<Self> = db
            .client
            .query("SELECT * FROM entity WHERE id IN $ids AND group_id = $group_id")
            .bind(("ids", thing_ids))
            .bind(("group_id", group_id.to_string()))
            .await?
            .take(0)?;

        let mut by_id: std::collections::HashMap<String, Self> = entities
            .into_iter()
            .map(|entity| (entity.id.clone(), entity))
            .collect();

        Ok(score_rows
            .into_iter()
            .filter_map(|row| by_id.remove(&row.id).map(|entity| (entity, row.score)))
            .collect())
    }

    /// Exact name or alias lookup within a group, used by `get_entity`.
    pub async fn find_by_name_or_alias(
        group_id: &str,
        name: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut rows: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM entity
                 WHERE group_id = $group_id
                   AND (canonical_name = $name OR $name IN aliases)
                 LIMIT 1",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("name", name.to_string()))
            .await?
            .take(0)?;
        Ok(rows.pop())
    }

    /// Full-text match against name and aliases, used alongside vector
    /// candidates during entity resolution.
    pub async fn fts_candidates(
        group_id: &str,
        query: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let sql = format!(
            r"SELECT * FROM entity
               WHERE group_id = $group_id
                 AND (name @0@ $query OR summary @1@ $query)
               LIMIT {limit};"
        );
        let rows: Vec<Self> = db
            .client
            .query(sql)
            .bind(("group_id", group_id.to_string()))
            .bind(("query", query.to_string()))
            .await?
            .take(0)?;
        Ok(rows)
    }

    /// BM25 full-text match over name + summary, with scores, used by
    /// `hybrid_search`'s entity leg.
    pub async fn fts_candidates_scored(
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
            r"SELECT id,
                     (IF search::score(0) != NONE THEN search::score(0) ELSE 0 END) +
                     (IF search::score(1) != NONE THEN search::score(1) ELSE 0 END) AS score
               FROM entity
               WHERE group_id = $group_id AND (name @0@ $query OR summary @1@ $query)
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
            .map(|row| surrealdb::sql::Thing::from(("entity", row.id.as_str())))
            .collect();

        let entities: Vec<Self> = db
            .client
            .query("SELECT * FROM entity WHERE id IN $ids AND group_id = $group_id")
            .bind(("ids", thing_ids))
            .bind(("group_id", group_id.to_string()))
            .await?
            .take(0)?;

        let mut by_id: std::collections::HashMap<String, Self> = entities
            .into_iter()
            .map(|entity| (entity.id.clone(), entity))
            .collect();

        Ok(score_rows
            .into_iter()
            .filter_map(|row| {
                by_id
                    .remove(&row.id)
                    .map(|entity| (entity, row.score.unwrap_or_default()))
            })
            .collect())
    }

    pub fn add_alias(&mut self, alias: String) {
        if alias != self.canonical_name && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
    }

    pub async fn save(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        let mut updated = self;
        updated.updated_at = Utc::now();
        Ok(db
            .store_item(updated.clone())
            .await?
            .unwrap_or(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid as TestUuid;

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
    async fn find_by_name_or_alias_matches_alias() {
        let db = SurrealDbClient::memory("entity_ns", &TestUuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let mut entity = sample_entity("org1:deal1", "Acme Corp");
        entity.add_alias("Acme".to_string());
        db.store_item(entity.clone()).await.expect("store entity");

        let found = Entity::find_by_name_or_alias("org1:deal1", "Acme", &db)
            .await
            .expect("query")
            .expect("found by alias");
        assert_eq!(found.id, entity.id);
    }

    #[tokio::test]
    async fn find_by_name_or_alias_is_scoped_to_group() {
        let db = SurrealDbClient::memory("entity_ns2", &TestUuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let entity = sample_entity("org1:deal1", "Acme Corp");
        db.store_item(entity).await.expect("store entity");

        let found = Entity::find_by_name_or_alias("org1:deal2", "Acme Corp", &db)
            .await
            .expect("query");
        assert!(found.is_none(), "entity must not leak across groups");
    }

    #[test]
    fn add_alias_is_idempotent_and_excludes_canonical_name() {
        let mut entity = sample_entity("org1:deal1", "Acme Corp");
        entity.add_alias("Acme".to_string());
        entity.add_alias("Acme".to_string());
        entity.add_alias("Acme Corp".to_string());
        assert_eq!(entity.aliases, vec!["Acme".to_string()]);
    }
}
