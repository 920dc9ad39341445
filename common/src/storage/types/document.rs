use chrono::{DateTime, Utc};
use mime_guess::from_path;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::{self, StorageManager},
    },
    stored_object,
};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum UploadStatus {
    Completed,
    Failed,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum ProcessingStatus {
    Pending,
    Parsing,
    Parsed,
    GraphitiIngesting,
    GraphitiIngested,
    Analyzing,
    Analyzed,
    Complete,
    Failed,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum CompletedStage {
    Parsed,
    GraphitiIngested,
    Analyzed,
    Complete,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum ReliabilityStatus {
    Trusted,
    ContainsErrors,
    Superseded,
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub struct RetryAttempt {
    pub attempted_at: chrono::DateTime<chrono::Utc>,
    pub stage: ProcessingStatus,
    pub error: String,
}

const MAX_RETRY_HISTORY: usize = 10;

stored_object!(Document, "document", {
    deal_id: String,
    name: String,
    blob_path: String,
    file_size: u64,
    mime_type: String,
    folder_path: String,
    category: Option<String>,
    upload_status: UploadStatus,
    processing_status: ProcessingStatus,
    last_completed_stage: Option<CompletedStage>,
    retry_history: Vec<RetryAttempt>,
    processing_error: Option<String>,
    reliability_status: ReliabilityStatus,
    error_count: u32
});

impl Document {
    fn guess_mime_type(path: &Path) -> String {
        from_path(path)
            .first_or(mime::APPLICATION_OCTET_STREAM)
            .to_string()
    }

    /// Persist uploaded bytes to the object store and create the document row
    /// in `pending` status. Upload is synchronous; parsing happens later via
    /// the job queue.
    pub async fn upload(
        deal_id: &str,
        file_name: &str,
        folder_path: &str,
        bytes: Vec<u8>,
        db: &SurrealDbClient,
        storage: &StorageManager,
    ) -> Result<Self, AppError> {
        let id = Uuid::new_v4().to_string();
        let location = format!("{deal_id}/{id}/{file_name}");
        let file_size = bytes.len() as u64;
        let mime_type = Self::guess_mime_type(Path::new(file_name));

        storage
            .put(&location, bytes.into())
            .await
            .map_err(|e| AppError::ObjectStore(e))?;

        let now = Utc::now();
        let document = Self {
            id,
            created_at: now,
            updated_at: now,
            deal_id: deal_id.to_string(),
            name: file_name.to_string(),
            blob_path: location,
            file_size,
            mime_type,
            folder_path: folder_path.to_string(),
            category: None,
            upload_status: UploadStatus::Completed,
            processing_status: ProcessingStatus::Pending,
            last_completed_stage: None,
            retry_history: Vec::new(),
            processing_error: None,
            reliability_status: ReliabilityStatus::Trusted,
            error_count: 0,
        };

        db.store_item(document.clone()).await?;
        info!(document_id = %document.id, deal_id, "document uploaded");

        Ok(document)
    }

    pub async fn get_scoped(
        id: &str,
        deal_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let document: Document = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("document not found".to_string()))?;

        if document.deal_id != deal_id {
            return Err(AppError::NotAuthorized(
                "document does not belong to this deal".to_string(),
            ));
        }

        Ok(document)
    }

    pub async fn get_content(&self, storage: &StorageManager) -> Result<bytes::Bytes, AppError> {
        storage
            .get(&self.blob_path)
            .await
            .map_err(AppError::ObjectStore)
    }

    /// Advance the processing status lattice by exactly one stage, or mark a
    /// terminal failure from any stage.
    pub async fn advance_stage(
        id: &str,
        new_status: ProcessingStatus,
        completed_stage: Option<CompletedStage>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let mut document: Document = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("document not found".to_string()))?;

        document.processing_status = new_status;
        if let Some(stage) = completed_stage {
            document.last_completed_stage = Some(stage);
        }
        document.updated_at = Utc::now();

        db.store_item(document.clone()).await?;
        Ok(document)
    }

    /// Record a retry attempt, truncating the history to the most recent
    /// `MAX_RETRY_HISTORY` entries.
    pub async fn record_retry(
        id: &str,
        stage: ProcessingStatus,
        error: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let mut document: Document = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("document not found".to_string()))?;

        document.retry_history.push(RetryAttempt {
            attempted_at: Utc::now(),
            stage,
            error: error.to_string(),
        });
        if document.retry_history.len() > MAX_RETRY_HISTORY {
            let overflow = document.retry_history.len() - MAX_RETRY_HISTORY;
            document.retry_history.drain(0..overflow);
        }
        document.error_count += 1;
        document.processing_error = Some(error.to_string());
        document.updated_at = Utc::now();

        db.store_item(document.clone()).await?;
        Ok(document)
    }

    /// Mark a document's reliability status, e.g. when a source-error
    /// correction cascades from a finding back to its originating document.
    pub async fn mark_reliability(
        id: &str,
        status: ReliabilityStatus,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let mut document: Document = db
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound("document not found".to_string()))?;

        document.reliability_status = status;
        document.updated_at = Utc::now();

        db.store_item(document.clone()).await?;
        Ok(document)
    }

    /// Delete the document row and its blob. Caller is responsible for
    /// cascading the delete to chunks, findings, and graph nodes.
    pub async fn delete_with_storage(
        id: &str,
        db: &SurrealDbClient,
        storage: &StorageManager,
    ) -> Result<(), AppError> {
        let Some(document) = db.get_item::<Document>(id).await? else {
            return Ok(());
        };

        let (parent_prefix, _file_name) =
            store::split_object_path(&document.blob_path).map_err(AppError::Anyhow)?;
        storage
            .delete_prefix(&parent_prefix)
            .await
            .map_err(AppError::ObjectStore)?;

        db.delete_item::<Document>(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::testing::TestStorageManager;

    #[tokio::test]
    async fn test_upload_and_get_scoped() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let storage = TestStorageManager::new_memory().await.expect("storage");

        let document = Document::upload(
            "deal_1",
            "financials.xlsx",
            "/financials",
            b"workbook bytes".to_vec(),
            &db,
            storage.storage(),
        )
        .await
        .expect("upload");

        assert_eq!(document.processing_status, ProcessingStatus::Pending);
        assert_eq!(document.deal_id, "deal_1");

        let fetched = Document::get_scoped(&document.id, "deal_1", &db)
            .await
            .expect("get scoped");
        assert_eq!(fetched.id, document.id);

        let wrong_deal = Document::get_scoped(&document.id, "deal_2", &db).await;
        assert!(matches!(wrong_deal, Err(AppError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_retry_history_bounded() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let storage = TestStorageManager::new_memory().await.expect("storage");
        let document = Document::upload(
            "deal_1",
            "report.pdf",
            "/",
            b"pdf bytes".to_vec(),
            &db,
            storage.storage(),
        )
        .await
        .expect("upload");

        for i in 0..15 {
            Document::record_retry(
                &document.id,
                ProcessingStatus::Parsing,
                &format!("attempt {i} failed"),
                &db,
            )
            .await
            .expect("record retry");
        }

        let final_doc: Document = db
            .get_item(&document.id)
            .await
            .expect("fetch")
            .expect("present");
        assert_eq!(final_doc.retry_history.len(), MAX_RETRY_HISTORY);
        assert_eq!(final_doc.error_count, 15);
    }

    #[tokio::test]
    async fn test_advance_stage() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let storage = TestStorageManager::new_memory().await.expect("storage");
        let document = Document::upload(
            "deal_1",
            "memo.docx",
            "/",
            b"docx bytes".to_vec(),
            &db,
            storage.storage(),
        )
        .await
        .expect("upload");

        let advanced = Document::advance_stage(
            &document.id,
            ProcessingStatus::Parsed,
            Some(CompletedStage::Parsed),
            &db,
        )
        .await
        .expect("advance stage");

        assert_eq!(advanced.processing_status, ProcessingStatus::Parsed);
        assert_eq!(advanced.last_completed_stage, Some(CompletedStage::Parsed));
    }
}
