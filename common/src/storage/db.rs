use crate::error::AppError;

use super::types::StoredObject;
use futures::Stream;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    /// Connect to SurrealDB, sign in with root credentials and select the
    /// namespace/database pair. One client instance backs both the
    /// relational store and the knowledge graph store.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Define the base tables and non-vector indexes used across the
    /// relational schema. Safe to run repeatedly.
    pub async fn apply_migrations(&self) -> Result<(), AppError> {
        self.client
            .query(
                "DEFINE TABLE IF NOT EXISTS job SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_job_state ON job FIELDS state;
                 DEFINE INDEX IF NOT EXISTS idx_job_name_state ON job FIELDS name, state, available_at;
                 DEFINE INDEX IF NOT EXISTS idx_job_singleton ON job FIELDS name, singleton_key;
                 DEFINE INDEX IF NOT EXISTS idx_job_created ON job FIELDS created_at;
                 DEFINE TABLE IF NOT EXISTS job_transition SCHEMALESS
                     PERMISSIONS FOR update, delete NONE;
                 DEFINE INDEX IF NOT EXISTS idx_job_transition_job ON job_transition FIELDS job_id;

                 DEFINE TABLE IF NOT EXISTS organization SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS organization_member SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_org_member_org ON organization_member FIELDS org_id;

                 DEFINE TABLE IF NOT EXISTS deal SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_deal_org ON deal FIELDS organization_id;

                 DEFINE TABLE IF NOT EXISTS folder SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_folder_deal ON folder FIELDS deal_id;

                 DEFINE TABLE IF NOT EXISTS document SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_document_deal ON document FIELDS deal_id;
                 DEFINE INDEX IF NOT EXISTS idx_document_status ON document FIELDS status;

                 DEFINE TABLE IF NOT EXISTS document_chunk SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_chunk_document ON document_chunk FIELDS document_id;

                 DEFINE TABLE IF NOT EXISTS finding SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_finding_deal ON finding FIELDS deal_id;
                 DEFINE INDEX IF NOT EXISTS idx_finding_document ON finding FIELDS document_id;

                 DEFINE TABLE IF NOT EXISTS finding_correction SCHEMALESS
                     PERMISSIONS FOR update, delete NONE;
                 DEFINE TABLE IF NOT EXISTS validation_feedback SCHEMALESS
                     PERMISSIONS FOR update, delete NONE;
                 DEFINE TABLE IF NOT EXISTS financial_metric SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_metric_deal ON financial_metric FIELDS deal_id;

                 DEFINE TABLE IF NOT EXISTS contradiction SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_contradiction_deal ON contradiction FIELDS deal_id;

                 DEFINE TABLE IF NOT EXISTS qa_item SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS irl SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS irl_item SCHEMALESS;

                 DEFINE TABLE IF NOT EXISTS conversation SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_conversation_deal ON conversation FIELDS deal_id;
                 DEFINE TABLE IF NOT EXISTS message SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_message_conversation ON message FIELDS conversation_id;

                 DEFINE TABLE IF NOT EXISTS llm_usage SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_usage_org ON llm_usage FIELDS org_id;
                 DEFINE TABLE IF NOT EXISTS feature_usage SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS audit_log SCHEMALESS
                     PERMISSIONS FOR update, delete NONE;
                 DEFINE INDEX IF NOT EXISTS idx_audit_org ON audit_log FIELDS org_id;
                 DEFINE TABLE IF NOT EXISTS feature_flag SCHEMALESS;

                 DEFINE TABLE IF NOT EXISTS cim SCHEMALESS;
                 DEFINE TABLE IF NOT EXISTS workflow_checkpoint SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_checkpoint_thread ON workflow_checkpoint FIELDS thread_id, checkpoint_ns;
                 DEFINE INDEX IF NOT EXISTS idx_checkpoint_created ON workflow_checkpoint FIELDS created_at;
                 DEFINE TABLE IF NOT EXISTS checkpoint_write SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_checkpoint_write_checkpoint ON checkpoint_write FIELDS checkpoint_id;
                 DEFINE TABLE IF NOT EXISTS checkpoint_blob SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_checkpoint_blob_checkpoint ON checkpoint_blob FIELDS checkpoint_id;

                 DEFINE TABLE IF NOT EXISTS entity SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_entity_group ON entity FIELDS group_id;
                 DEFINE TABLE IF NOT EXISTS fact_edge SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_edge_group ON fact_edge FIELDS group_id;
                 DEFINE TABLE IF NOT EXISTS episode SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_episode_group ON episode FIELDS group_id;",
            )
            .await?;

        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    /// Store an object, requires the struct to implement `StoredObject`.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Retrieve all objects from a table, requires the struct to implement `StoredObject`.
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    /// Retrieve a single object by its ID, requires the struct to implement `StoredObject`.
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Delete a single object by its ID, requires the struct to implement `StoredObject`.
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Listen to a table for live updates, requires the struct to implement `StoredObject`.
    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.apply_migrations()
            .await
            .expect("Failed to apply migrations");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert!(all.contains(&dummy));

        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_apply_migrations_is_idempotent() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.apply_migrations().await.expect("first migration run");
        db.apply_migrations().await.expect("second migration run");
    }
}
