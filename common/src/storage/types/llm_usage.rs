use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(LlmUsage, "llm_usage", {
    org_id: String,
    deal_id: Option<String>,
    user_id: String,
    provider: String,
    model: String,
    feature: String,
    input_tokens: u32,
    output_tokens: u32,
    cost_usd: f64,
    latency_ms: u64,
    status: String,
    error_message: Option<String>,
    metadata: Value
});

impl LlmUsage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org_id: String,
        deal_id: Option<String>,
        user_id: String,
        provider: String,
        model: String,
        feature: String,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
        latency_ms: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            org_id,
            deal_id,
            user_id,
            provider,
            model,
            feature,
            input_tokens,
            output_tokens,
            cost_usd,
            latency_ms,
            status: "success".to_string(),
            error_message: None,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    pub async fn record(self, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.store_item(self.clone()).await?;
        Ok(self)
    }

    /// Sum of `cost_usd` for an organization over all recorded usage rows,
    /// used by the daily cost alert threshold in C12.
    pub async fn total_cost_for_org(org_id: &str, db: &SurrealDbClient) -> Result<f64, AppError> {
        #[derive(Deserialize)]
        struct CostRow {
            total: f64,
        }

        let rows: Vec<CostRow> = db
            .client
            .query("SELECT math::sum(cost_usd) AS total FROM llm_usage WHERE org_id = $org_id GROUP ALL")
            .bind(("org_id", org_id.to_string()))
            .await?
            .take(0)?;

        Ok(rows.first().map_or(0.0, |r| r.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_total_cost_for_org() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let a = LlmUsage::new(
            "org_1".into(),
            Some("deal_1".into()),
            "user_1".into(),
            "openai".into(),
            "gpt-4o".into(),
            "extraction".into(),
            1000,
            200,
            0.015,
            800,
        );
        let b = LlmUsage::new(
            "org_1".into(),
            Some("deal_1".into()),
            "user_1".into(),
            "openai".into(),
            "gpt-4o".into(),
            "chat".into(),
            500,
            100,
            0.008,
            400,
        );
        a.record(&db).await.expect("record a");
        b.record(&db).await.expect("record b");

        let total = LlmUsage::total_cost_for_org("org_1", &db)
            .await
            .expect("total cost");
        assert!((total - 0.023).abs() < 1e-9);
    }
}
