use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::document::{CompletedStage, Document, ProcessingStatus},
    storage::types::document_chunk::DocumentChunk,
    storage::types::finding::Finding,
};
use job_queue::{runtime::Context, HandlerOutcome, JobHandler};
use serde_json::{json, Value};

use crate::findings::extract_findings;

use super::common::{outcome_for_error, require_str, IngestionDeps};

pub struct AnalyzeDocumentHandler {
    pub deps: IngestionDeps,
}

#[async_trait]
impl JobHandler for AnalyzeDocumentHandler {
    async fn handle(&self, payload: Value, ctx: Context) -> HandlerOutcome {
        match self.run(payload, &ctx).await {
            Ok(output) => HandlerOutcome::Success(output),
            Err(err) => outcome_for_error(err),
        }
    }
}

impl AnalyzeDocumentHandler {
    async fn run(&self, payload: Value, ctx: &Context) -> Result<Value, AppError> {
        let document_id = require_str(&payload, "document_id")?;
        let deal_id = ctx
            .deal_id
            .as_deref()
            .ok_or_else(|| AppError::Validation("job payload missing deal_id".into()))?;

        let document = Document::get_scoped(document_id, deal_id, &self.deps.db).await?;

        Document::advance_stage(document_id, ProcessingStatus::Analyzing, None, &self.deps.db).await?;

        let existing = Finding::list_for_document(document_id, &self.deps.db).await?.len();

        let mut created = 0usize;
        if existing == 0 {
            let chunks = DocumentChunk::list_for_document(document_id, &self.deps.db).await?;
            for chunk in &chunks {
                let extraction = match extract_findings(
                    &self.deps.llm,
                    &self.deps.tuning.findings_model,
                    &chunk.content,
                )
                .await
                {
                    Ok(extraction) => extraction,
                    Err(err) => {
                        Document::record_retry(
                            document_id,
                            ProcessingStatus::Analyzing,
                            &err.to_string(),
                            &self.deps.db,
                        )
                        .await?;
                        return Err(err);
                    }
                };

                for extracted in extraction.findings {
                    let mut finding = Finding::new(
                        deal_id.to_string(),
                        Some(document_id.to_string()),
                        Some(chunk.id.clone()),
                        extracted.text.clone(),
                        document.name.clone(),
                        extracted.confidence,
                        extracted.finding_type(),
                        extracted.domain(),
                    );
                    finding.page_number = extracted.page_number.or(chunk.page_number);
                    self.deps.db.store_item(finding).await?;
                    created += 1;
                }
            }
        }

        Document::advance_stage(
            document_id,
            ProcessingStatus::Analyzed,
            Some(CompletedStage::Analyzed),
            &self.deps.db,
        )
        .await?;
        Document::advance_stage(
            document_id,
            ProcessingStatus::Complete,
            Some(CompletedStage::Complete),
            &self.deps.db,
        )
        .await?;

        Ok(json!({ "document_id": document_id, "findings_created": created }))
    }
}
