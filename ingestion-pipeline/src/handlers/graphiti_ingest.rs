use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::document::{CompletedStage, Document, ProcessingStatus},
    storage::types::document_chunk::DocumentChunk,
};
use job_queue::{runtime::Context, EnqueueOptions, HandlerOutcome, Job, JobHandler};
use knowledge_graph::SourceChannel;
use serde_json::{json, Value};

use super::common::{group_id, outcome_for_error, require_str, IngestionDeps};

pub struct GraphitiIngestHandler {
    pub deps: IngestionDeps,
}

#[async_trait]
impl JobHandler for GraphitiIngestHandler {
    async fn handle(&self, payload: Value, ctx: Context) -> HandlerOutcome {
        match self.run(payload, &ctx).await {
            Ok(output) => HandlerOutcome::Success(output),
            Err(err) => outcome_for_error(err),
        }
    }
}

impl GraphitiIngestHandler {
    async fn run(&self, payload: Value, ctx: &Context) -> Result<Value, AppError> {
        let document_id = require_str(&payload, "document_id")?;
        let deal_id = ctx
            .deal_id
            .as_deref()
            .ok_or_else(|| AppError::Validation("job payload missing deal_id".into()))?;

        let document = Document::get_scoped(document_id, deal_id, &self.deps.db).await?;
        let group = group_id(&ctx.org_id, deal_id);

        // Only chunks that never got an `episode_id` back-reference are
        // ingested, so a retried job resumes instead of double-ingesting.
        let pending = DocumentChunk::list_not_ingested(document_id, &self.deps.db).await?;
        let mut ingested = 0usize;
        for chunk in &pending {
            let episode_id = match self
                .deps
                .graph
                .add_episode(
                    &group,
                    &chunk.content,
                    SourceChannel::Document,
                    document.created_at,
                    &document.name,
                    Some(chunk.id.clone()),
                )
                .await
            {
                Ok(id) => id,
                Err(err) => {
                    Document::record_retry(
                        document_id,
                        ProcessingStatus::GraphitiIngesting,
                        &err.to_string(),
                        &self.deps.db,
                    )
                    .await?;
                    return Err(err);
                }
            };
            DocumentChunk::mark_ingested(&chunk.id, &episode_id, &self.deps.db).await?;
            ingested += 1;
        }

        Document::advance_stage(
            document_id,
            ProcessingStatus::GraphitiIngested,
            Some(CompletedStage::GraphitiIngested),
            &self.deps.db,
        )
        .await?;

        let job_id = Job::enqueue(
            "analyze_document",
            json!({ "document_id": document_id, "org_id": ctx.org_id, "deal_id": deal_id }),
            EnqueueOptions {
                singleton_key: Some(format!("analyze_document:{document_id}")),
                ..Default::default()
            },
            &self.deps.db,
        )
        .await?;

        Ok(json!({ "document_id": document_id, "ingested": ingested, "next_job": job_id }))
    }
}
