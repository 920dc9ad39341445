use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::{
        document::{CompletedStage, Document, ProcessingStatus},
        document_chunk::{ChunkType, DocumentChunk},
    },
};
use job_queue::{runtime::Context, EnqueueOptions, HandlerOutcome, Job, JobHandler};
use serde_json::{json, Value};
use tracing::info;

use crate::chunking::{docx, pdf, text, xlsx, ChunkingOutput, DocumentFormat};

use super::common::{materialize_to_tempfile, outcome_for_error, require_str, IngestionDeps};

pub struct ParseDocumentHandler {
    pub deps: IngestionDeps,
}

#[async_trait]
impl JobHandler for ParseDocumentHandler {
    async fn handle(&self, payload: Value, ctx: Context) -> HandlerOutcome {
        match self.run(payload, &ctx).await {
            Ok(output) => HandlerOutcome::Success(output),
            Err(err) => outcome_for_error(err),
        }
    }
}

impl ParseDocumentHandler {
    async fn run(&self, payload: Value, ctx: &Context) -> Result<Value, AppError> {
        let document_id = require_str(&payload, "document_id")?;
        let deal_id = ctx
            .deal_id
            .as_deref()
            .ok_or_else(|| AppError::Validation("job payload missing deal_id".into()))?;

        let document = Document::get_scoped(document_id, deal_id, &self.deps.db).await?;

        // Idempotent: a prior attempt that parsed but failed before
        // advancing the document stage leaves chunks in place; skip reparsing.
        let existing = DocumentChunk::list_for_document(document_id, &self.deps.db).await?;
        if existing.is_empty() {
            let output = match self.parse(&document).await {
                Ok(output) => output,
                Err(err) => {
                    Document::record_retry(
                        document_id,
                        ProcessingStatus::Parsing,
                        &err.to_string(),
                        &self.deps.db,
                    )
                    .await?;
                    return Err(err);
                }
            };
            for note in &output.notes {
                info!(document_id, note = %note, "chunking note");
            }
            DocumentChunk::replace_for_document(document_id, output.chunks, &self.deps.db).await?;
        }

        Document::advance_stage(
            document_id,
            ProcessingStatus::Parsed,
            Some(CompletedStage::Parsed),
            &self.deps.db,
        )
        .await?;

        let job_id = Job::enqueue(
            "graphiti_ingest",
            json!({ "document_id": document_id, "org_id": ctx.org_id, "deal_id": deal_id }),
            EnqueueOptions {
                singleton_key: Some(format!("graphiti_ingest:{document_id}")),
                ..Default::default()
            },
            &self.deps.db,
        )
        .await?;

        Ok(json!({ "document_id": document_id, "next_job": job_id }))
    }

    async fn parse(&self, document: &Document) -> Result<ChunkingOutput, AppError> {
        let bytes = document.get_content(&self.deps.storage).await?;
        let format = DocumentFormat::detect(&document.mime_type, &bytes)?;
        let token_range = self.deps.tuning.token_range.clone();
        let overlap = self.deps.tuning.overlap_tokens;

        match format {
            DocumentFormat::Pdf => {
                let (_guard, path) = materialize_to_tempfile(&self.deps.storage, &document.blob_path, ".pdf").await?;
                let pages = pdf::parse_pdf(&path, &self.deps.llm, &self.deps.tuning.vision_model).await?;
                let chunks = pdf::pdf_pages_to_chunks(&document.id, pages, token_range, overlap)?;
                Ok(ChunkingOutput::new(chunks))
            }
            DocumentFormat::Xlsx => {
                let (_guard, path) = materialize_to_tempfile(&self.deps.storage, &document.blob_path, ".xlsx").await?;
                let (sheets, notes) = xlsx::parse_xlsx(&path)?;
                let chunks = xlsx::xlsx_sheets_to_chunks(&document.id, sheets, token_range);
                let mut output = ChunkingOutput::new(chunks);
                output.notes = notes;
                Ok(output)
            }
            DocumentFormat::Docx => {
                let (_guard, path) = materialize_to_tempfile(&self.deps.storage, &document.blob_path, ".docx").await?;
                let blocks = docx::parse_docx(&path)?;
                let chunks = docx::docx_blocks_to_chunks(&document.id, blocks, token_range, overlap)?;
                Ok(ChunkingOutput::new(chunks))
            }
            DocumentFormat::PlainText => {
                let body = String::from_utf8_lossy(&bytes).into_owned();
                let windows = text::window_text(&body, token_range, overlap)?;
                let chunks = text::to_document_chunks(&document.id, windows, ChunkType::Text, 0);
                Ok(ChunkingOutput::new(chunks))
            }
        }
    }
}
