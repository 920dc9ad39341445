use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Crate-wide error taxonomy. Each variant's propagation behavior (retry vs.
/// surface vs. terminal) is decided by callers matching on the variant, not
/// encoded here; see `is_retryable`/`is_terminal` below.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient I/O error: {0}")]
    TransientIO(String),
    #[error("provider rate limited: {0}")]
    ProviderRateLimited(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider returned an unexpected contract: {0}")]
    ProviderContract(String),
    #[error("document cannot be parsed: {0}")]
    ParseError(String),
    #[error("knowledge graph degraded: {0}")]
    DegradedKnowledge(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("task join error: {0}")]
    Join(#[from] JoinError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Short machine-readable kind used in API error envelopes (`error_kind`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotAuthorized(_) => "not_authorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::TransientIO(_) | Self::Io(_) | Self::ObjectStore(_) => "transient_io",
            Self::ProviderRateLimited(_) => "provider_rate_limited",
            Self::ProviderUnavailable(_) | Self::OpenAI(_) | Self::Reqwest(_) => {
                "provider_unavailable"
            }
            Self::ProviderContract(_) | Self::Json(_) => "provider_contract",
            Self::ParseError(_) => "parse_error",
            Self::DegradedKnowledge(_) => "degraded_knowledge",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) | Self::Database(_) | Self::Join(_) | Self::Anyhow(_) => "internal",
        }
    }

    /// Whether a worker handler should treat this as retryable (§4.2 `Retryable`)
    /// as opposed to terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientIO(_)
                | Self::ProviderRateLimited(_)
                | Self::ProviderUnavailable(_)
                | Self::Timeout(_)
                | Self::Io(_)
                | Self::ObjectStore(_)
                | Self::OpenAI(_)
                | Self::Reqwest(_)
                | Self::Database(_)
        )
    }
}
