use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub enum ChunkType {
    Text,
    Table,
    Formula,
    Image,
}

stored_object!(DocumentChunk, "document_chunk", {
    document_id: String,
    chunk_index: u32,
    content: String,
    chunk_type: ChunkType,
    page_number: Option<u32>,
    sheet_name: Option<String>,
    cell_reference: Option<String>,
    token_count: u32,
    metadata: Value,
    // Set once `graphiti_ingest` has turned this chunk into a knowledge-graph
    // episode; absence is what makes re-running the job idempotent.
    episode_id: Option<String>
});

impl DocumentChunk {
    pub fn new(
        document_id: String,
        chunk_index: u32,
        content: String,
        chunk_type: ChunkType,
        token_count: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            chunk_index,
            content,
            chunk_type,
            page_number: None,
            sheet_name: None,
            cell_reference: None,
            token_count,
            metadata: Value::Object(serde_json::Map::new()),
            episode_id: None,
        }
    }

    pub async fn mark_ingested(
        id: &str,
        episode_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("UPDATE type::thing('document_chunk', $id) SET episode_id = $episode_id, updated_at = time::now()")
            .bind(("id", id.to_string()))
            .bind(("episode_id", episode_id.to_string()))
            .await?;
        Ok(())
    }

    pub async fn list_not_ingested(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .client
            .query("SELECT * FROM document_chunk WHERE document_id = $document_id AND episode_id = NONE ORDER BY chunk_index")
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;
        Ok(chunks)
    }

    /// Replace every chunk belonging to `document_id` with `chunks`, enforcing
    /// dense zero-based `chunk_index` per document.
    pub async fn replace_for_document(
        document_id: &str,
        chunks: Vec<Self>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        for (expected_index, chunk) in chunks.iter().enumerate() {
            if chunk.chunk_index as usize != expected_index {
                return Err(AppError::Internal(format!(
                    "chunk_index must be dense starting at 0, got {} at position {}",
                    chunk.chunk_index, expected_index
                )));
            }
        }

        Self::delete_by_document_id(document_id, db).await?;
        for chunk in chunks {
            db.store_item(chunk).await?;
        }
        Ok(())
    }

    pub async fn delete_by_document_id(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE document_chunk WHERE document_id = $document_id")
            .bind(("document_id", document_id.to_string()))
            .await?;
        Ok(())
    }

    pub async fn list_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .client
            .query("SELECT * FROM document_chunk WHERE document_id = $document_id ORDER BY chunk_index")
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_for_document_rejects_sparse_index() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let chunks = vec![
            DocumentChunk::new("doc_1".into(), 0, "first".into(), ChunkType::Text, 4),
            DocumentChunk::new("doc_1".into(), 2, "third".into(), ChunkType::Text, 4),
        ];

        let result = DocumentChunk::replace_for_document("doc_1", chunks, &db).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_replace_for_document_roundtrip() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");

        let chunks = vec![
            DocumentChunk::new("doc_1".into(), 0, "first".into(), ChunkType::Text, 4),
            DocumentChunk::new("doc_1".into(), 1, "second".into(), ChunkType::Text, 4),
        ];

        DocumentChunk::replace_for_document("doc_1", chunks, &db)
            .await
            .expect("replace chunks");

        let listed = DocumentChunk::list_for_document("doc_1", &db)
            .await
            .expect("list chunks");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "first");
        assert_eq!(listed[1].content, "second");
    }
}
