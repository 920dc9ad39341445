use axum::{extract::State, response::IntoResponse, Extension, Json};
use knowledge_graph::store::CandidateKind;
use retrieval_pipeline::RetrievalFilters;
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError, principal::Principal};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub deal_id: String,
    pub query: String,
    pub limit: Option<usize>,
    #[serde(default)]
    pub kinds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseCitation {
    pub candidate_id: String,
    pub source: String,
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub context: String,
    pub citations: Vec<SearchResponseCitation>,
}

fn parse_kind(kind: &str) -> Option<CandidateKind> {
    match kind {
        "episode" => Some(CandidateKind::Episode),
        "entity" => Some(CandidateKind::Entity),
        _ => None,
    }
}

/// `POST /search/hybrid`: runs the C9 retrieval pipeline directly, for
/// analysts who want to inspect retrieval without going through a chat turn.
pub async fn hybrid_search(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kinds: Vec<CandidateKind> = request.kinds.iter().filter_map(|k| parse_kind(k)).collect();
    let filters = RetrievalFilters { kinds: if kinds.is_empty() { None } else { Some(kinds) } };

    let assembled = state
        .retrieval
        .retrieve(&principal.org_id, &request.deal_id, &request.query, request.limit, filters)
        .await?;

    Ok(Json(SearchResponse {
        context: assembled.text,
        citations: assembled
            .citations
            .into_iter()
            .map(|c| SearchResponseCitation { candidate_id: c.candidate_id, source: c.source, channel: c.channel })
            .collect(),
    }))
}
