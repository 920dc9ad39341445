use chrono::Utc;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(FinancialMetric, "financial_metric", {
    document_id: String,
    finding_id: Option<String>,
    metric_name: String,
    metric_category: String,
    value: f64,
    unit: String,
    period_type: String,
    fiscal_year: u32,
    fiscal_quarter: Option<u8>,
    source_cell: Option<String>,
    source_sheet: Option<String>,
    source_page: Option<u32>,
    source_formula: Option<String>,
    is_actual: bool,
    confidence: f32
});

impl FinancialMetric {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document_id: String,
        metric_name: String,
        metric_category: String,
        value: f64,
        unit: String,
        period_type: String,
        fiscal_year: u32,
        confidence: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            finding_id: None,
            metric_name,
            metric_category,
            value,
            unit,
            period_type,
            fiscal_year,
            fiscal_quarter: None,
            source_cell: None,
            source_sheet: None,
            source_page: None,
            source_formula: None,
            is_actual: true,
            confidence,
        }
    }

    pub async fn list_for_deal(
        deal_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let metrics: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM financial_metric WHERE document_id IN \
                 (SELECT VALUE id FROM document WHERE deal_id = $deal_id)",
            )
            .bind(("deal_id", deal_id.to_string()))
            .await?
            .take(0)?;
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_metric_defaults() {
        let metric = FinancialMetric::new(
            "doc_1".into(),
            "Revenue".into(),
            "income_statement".into(),
            12_400_000.0,
            "USD".into(),
            "annual".into(),
            2025,
            0.95,
        );
        assert!(metric.is_actual);
        assert_eq!(metric.fiscal_year, 2025);
    }
}
