use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError, principal::Principal};

fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_admin {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("superadmin access required".to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DailyCostRow {
    day: String,
    total: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureCostRow {
    feature: String,
    total: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelCostRow {
    model: String,
    total: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DealCostRow {
    deal_id: Option<String>,
    total: f64,
}

#[derive(Debug, Serialize)]
struct RecentErrorRow {
    created_at: chrono::DateTime<chrono::Utc>,
    provider: String,
    model: String,
    error_message: Option<String>,
}

/// `GET /admin/usage/daily`: daily LLM spend for an org, superadmin only.
/// No aggregation like this exists on `LlmUsage` yet (only
/// `total_cost_for_org`), so it's kept as a local ad hoc query here rather
/// than growing `common`'s public surface for a single dashboard's sake.
pub async fn usage_daily(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&principal)?;

    let rows: Vec<DailyCostRow> = state
        .db
        .client
        .query(
            "SELECT time::format(created_at, '%Y-%m-%d') AS day, math::sum(cost_usd) AS total \
             FROM llm_usage WHERE org_id = $org_id GROUP BY day ORDER BY day",
        )
        .bind(("org_id", principal.org_id.clone()))
        .await
        .map_err(common::error::AppError::from)?
        .take(0)
        .map_err(common::error::AppError::from)?;

    Ok(Json(rows))
}

/// `GET /admin/usage/by-feature`: LLM spend grouped by feature label.
pub async fn usage_by_feature(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&principal)?;

    let rows: Vec<FeatureCostRow> = state
        .db
        .client
        .query("SELECT feature, math::sum(cost_usd) AS total FROM llm_usage WHERE org_id = $org_id GROUP BY feature")
        .bind(("org_id", principal.org_id.clone()))
        .await
        .map_err(common::error::AppError::from)?
        .take(0)
        .map_err(common::error::AppError::from)?;

    Ok(Json(rows))
}

/// `GET /admin/usage/by-model`: LLM spend grouped by model.
pub async fn usage_by_model(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&principal)?;

    let rows: Vec<ModelCostRow> = state
        .db
        .client
        .query("SELECT model, math::sum(cost_usd) AS total FROM llm_usage WHERE org_id = $org_id GROUP BY model")
        .bind(("org_id", principal.org_id.clone()))
        .await
        .map_err(common::error::AppError::from)?
        .take(0)
        .map_err(common::error::AppError::from)?;

    Ok(Json(rows))
}

/// `GET /admin/usage/by-deal`: LLM spend grouped by deal, for a per-deal
/// cost summary.
pub async fn usage_by_deal(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&principal)?;

    let rows: Vec<DealCostRow> = state
        .db
        .client
        .query("SELECT deal_id, math::sum(cost_usd) AS total FROM llm_usage WHERE org_id = $org_id GROUP BY deal_id")
        .bind(("org_id", principal.org_id.clone()))
        .await
        .map_err(common::error::AppError::from)?
        .take(0)
        .map_err(common::error::AppError::from)?;

    Ok(Json(rows))
}

/// `GET /admin/usage/errors`: the most recent failed LLM calls for the org.
pub async fn usage_recent_errors(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&principal)?;

    let rows: Vec<RecentErrorRow> = state
        .db
        .client
        .query(
            "SELECT created_at, provider, model, error_message FROM llm_usage \
             WHERE org_id = $org_id AND status != 'success' ORDER BY created_at DESC LIMIT 50",
        )
        .bind(("org_id", principal.org_id.clone()))
        .await
        .map_err(common::error::AppError::from)?
        .take(0)
        .map_err(common::error::AppError::from)?;

    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
struct UsageSummary {
    total_cost_usd: f64,
}

/// `GET /admin/usage/summary`: overall spend for the org.
pub async fn usage_summary(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&principal)?;

    let total_cost_usd = common::storage::types::llm_usage::LlmUsage::total_cost_for_org(&principal.org_id, &state.db).await?;

    Ok(Json(UsageSummary { total_cost_usd }))
}
