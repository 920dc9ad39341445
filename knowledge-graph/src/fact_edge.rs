use common::{error::AppError, storage::db::SurrealDbClient, stored_object};

use crate::episode::SourceChannel;

/// Meta-classification tags attached to a `FactEdge` describing how it
/// relates to the rest of the graph, distinct from `relation` (the free-form
/// semantic predicate extracted by the LLM, e.g. `"acquired_by"`).
#[derive(Deserialize, Debug, Clone, Serialize, PartialEq, Eq)]
pub enum FactLabel {
    Supports,
    Contradicts,
    Supersedes,
    ExtractedFrom,
}

stored_object!(FactEdge, "fact_edge", {
    group_id: String,
    subject_id: String,
    relation: String,
    object_id: String,
    period: Option<String>,
    valid_at: DateTime<Utc>,
    invalid_at: Option<DateTime<Utc>>,
    confidence: f64,
    provenance_episode_id: String,
    labels: Vec<FactLabel>,
    supersedes: Option<String>,
    superseded_by: Option<String>
});

/// Source-calibrated confidence for newly-extracted facts. Analyst input is
/// trusted more than document extraction; contradiction-derived edges get
/// their own, lower, fixed confidence regardless of channel.
pub const fn base_confidence_for_channel(channel: SourceChannel) -> f64 {
    match channel {
        SourceChannel::AnalystChat => 0.95,
        SourceChannel::QaResponse | SourceChannel::MeetingNote => 0.90,
        SourceChannel::Document => 0.85,
    }
}

pub const CONTRADICTION_DERIVED_CONFIDENCE: f64 = 0.80;

impl FactEdge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: String,
        subject_id: String,
        relation: String,
        object_id: String,
        period: Option<String>,
        confidence: f64,
        provenance_episode_id: String,
        labels: Vec<FactLabel>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            group_id,
            subject_id,
            relation,
            object_id,
            period,
            valid_at: now,
            invalid_at: None,
            confidence,
            provenance_episode_id,
            labels,
            supersedes: None,
            superseded_by: None,
        }
    }

    /// Finds the currently-active edge (if any) matching the
    /// `(subject, relation, object, period)` signature used to detect
    /// supersession candidates.
    pub async fn find_active_by_signature(
        group_id: &str,
        subject_id: &str,
        relation: &str,
        object_id: &str,
        period: Option<&str>,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut rows: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM fact_edge
                 WHERE group_id = $group_id
                   AND subject_id = $subject_id
                   AND relation = $relation
                   AND object_id = $object_id
                   AND period = $period
                   AND invalid_at = NONE
                 LIMIT 1",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("subject_id", subject_id.to_string()))
            .bind(("relation", relation.to_string()))
            .bind(("object_id", object_id.to_string()))
            .bind(("period", period.map(ToString::to_string)))
            .await?
            .take(0)?;
        Ok(rows.pop())
    }

    /// Sets `invalid_at = now` on a superseded edge and records the pointer
    /// to its replacement. `FactEdge`s are otherwise immutable (invariant 5).
    pub async fn mark_superseded_by(
        id: &str,
        superseding_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('fact_edge', $id)
                 SET invalid_at = time::now(), superseded_by = $superseding_id",
            )
            .bind(("id", id.to_string()))
            .bind(("superseding_id", superseding_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    /// Active edges sharing `(subject, relation, period)` but any object —
    /// used to detect a conflicting re-assertion (e.g. the CEO changing)
    /// distinct from a verbatim restatement of the same fact.
    pub async fn find_active_by_subject_relation_period(
        group_id: &str,
        subject_id: &str,
        relation: &str,
        period: Option<&str>,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let rows: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM fact_edge
                 WHERE group_id = $group_id
                   AND subject_id = $subject_id
                   AND relation = $relation
                   AND period = $period
                   AND invalid_at = NONE",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("subject_id", subject_id.to_string()))
            .bind(("relation", relation.to_string()))
            .bind(("period", period.map(ToString::to_string)))
            .await?
            .take(0)?;
        Ok(rows)
    }

    pub async fn list_active_for_entity(
        group_id: &str,
        entity_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let rows: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM fact_edge
                 WHERE group_id = $group_id
                   AND (subject_id = $entity_id OR object_id = $entity_id)
                   AND invalid_at = NONE",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("entity_id", entity_id.to_string()))
            .await?
            .take(0)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid as TestUuid;

    #[tokio::test]
    async fn supersession_marks_old_edge_invalid_and_linked() {
        let db = SurrealDbClient::memory("fact_edge_ns", &TestUuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let old_edge = FactEdge::new(
            "org1:deal1".into(),
            "entity_a".into(),
            "reports_revenue".into(),
            "entity_b".into(),
            Some("FY2024".into()),
            base_confidence_for_channel(SourceChannel::Document),
            "episode_1".into(),
            vec![FactLabel::ExtractedFrom],
        );
        db.store_item(old_edge.clone())
            .await
            .expect("store old edge");

        let new_edge = FactEdge::new(
            "org1:deal1".into(),
            "entity_a".into(),
            "reports_revenue".into(),
            "entity_b".into(),
            Some("FY2024".into()),
            base_confidence_for_channel(SourceChannel::AnalystChat),
            "episode_2".into(),
            vec![FactLabel::ExtractedFrom, FactLabel::Supersedes],
        );
        db.store_item(new_edge.clone())
            .await
            .expect("store new edge");

        FactEdge::mark_superseded_by(&old_edge.id, &new_edge.id, &db)
            .await
            .expect("mark superseded");

        let found = FactEdge::find_active_by_signature(
            "org1:deal1",
            "entity_a",
            "reports_revenue",
            "entity_b",
            Some("FY2024"),
            &db,
        )
        .await
        .expect("query active");

        assert_eq!(
            found.expect("exactly one active edge").id,
            new_edge.id,
            "only the superseding edge should remain active"
        );
    }
}
