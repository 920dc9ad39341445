use std::ops::Range;

use common::utils::config::AppConfig;

/// Tuning knobs for the ingestion pipeline that sit outside the shared
/// `AppConfig` (which is process-wide, not pipeline-specific). Loaded once
/// at worker startup and shared across handler instances.
#[derive(Clone, Debug)]
pub struct IngestionTuning {
    pub token_range: Range<usize>,
    pub overlap_tokens: usize,
    pub vision_model: String,
    pub extraction_model: String,
    pub findings_model: String,
    pub source_error_cascade_enabled: bool,
    pub auto_flag_document_findings: bool,
}

impl IngestionTuning {
    /// Builds tuning from environment variables, falling back to the
    /// window defaults and the feature-flag map carried on `AppConfig`.
    pub fn from_env(cfg: &AppConfig) -> Self {
        let min_tokens = std::env::var("INGESTION_MIN_CHUNK_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(super::chunking::text::DEFAULT_TOKEN_RANGE.start);
        let max_tokens = std::env::var("INGESTION_MAX_CHUNK_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(super::chunking::text::DEFAULT_TOKEN_RANGE.end);
        let overlap_tokens = std::env::var("INGESTION_CHUNK_OVERLAP_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(super::chunking::text::DEFAULT_OVERLAP_TOKENS);

        Self {
            token_range: min_tokens..max_tokens,
            overlap_tokens,
            vision_model: std::env::var("INGESTION_VISION_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
            extraction_model: std::env::var("INGESTION_EXTRACTION_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            findings_model: std::env::var("INGESTION_FINDINGS_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            // Both default off: a source-error cascade touches every finding
            // from a document, so it's opt-in per deployment.
            source_error_cascade_enabled: *cfg
                .feature
                .get("source_error_cascade_enabled")
                .unwrap_or(&false),
            auto_flag_document_findings: *cfg
                .feature
                .get("auto_flag_document_findings")
                .unwrap_or(&false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_window_constants() {
        let cfg = AppConfig::default();
        let tuning = IngestionTuning::from_env(&cfg);
        assert!(!tuning.source_error_cascade_enabled);
        assert!(!tuning.auto_flag_document_findings);
        assert_eq!(tuning.token_range, super::super::chunking::text::DEFAULT_TOKEN_RANGE);
    }
}
