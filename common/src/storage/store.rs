use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result as AnyResult};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Gateway onto the object store holding uploaded deal documents. One
/// instance per process; cloned freely since the underlying store is an
/// `Arc<dyn ObjectStore>`.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self {
            store,
            backend_kind,
            local_base,
        })
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// Resolved local base directory when running on the local backend.
    pub fn local_base_path(&self) -> Option<&Path> {
        self.local_base.as_deref()
    }

    pub async fn put(&self, blob_path: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(blob_path);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Fetches and buffers a whole object in memory. Documents in this
    /// system are bounded by the upload-size limit enforced at the API
    /// layer, so streaming is unnecessary for the read path.
    pub async fn get(&self, blob_path: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(blob_path);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// Deletes every object under `prefix`, e.g. a document's whole
    /// `{deal_id}/{document_id}/` tree. Best-effort cleanup of now-empty
    /// directories follows on the local backend.
    pub async fn delete_prefix(&self, prefix: &str) -> object_store::Result<()> {
        let prefix_path = ObjPath::from(prefix);
        let locations = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|m| m.location)
            .boxed();
        self.store
            .delete_stream(locations)
            .try_collect::<Vec<_>>()
            .await?;

        if matches!(self.backend_kind, StorageKind::Local) {
            self.cleanup_filesystem_directories(prefix).await?;
        }

        Ok(())
    }

    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }

    pub async fn exists(&self, blob_path: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(blob_path);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }

    async fn cleanup_filesystem_directories(&self, prefix: &str) -> object_store::Result<()> {
        if !matches!(self.backend_kind, StorageKind::Local) {
            return Ok(());
        }

        let Some(base) = &self.local_base else {
            return Ok(());
        };

        let relative = Path::new(prefix);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            tracing::warn!(prefix = %prefix, "skipping directory cleanup for unsupported prefix");
            return Ok(());
        }

        let mut current = base.join(relative);

        while current.starts_with(base) && current.as_path() != base.as_path() {
            match tokio::fs::remove_dir(&current).await {
                Ok(_) => {}
                Err(err) => match err.kind() {
                    ErrorKind::NotFound => {}
                    ErrorKind::DirectoryNotEmpty => break,
                    _ => tracing::debug!(
                        error = %err,
                        path = %current.display(),
                        "failed to remove directory during cleanup"
                    ),
                },
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(())
    }
}

/// Builds the object store backend named by `cfg.storage`. S3 credentials
/// fall back to the environment (`AWS_*`) unless `blob_credentials` is set
/// as an explicit `access_key_id:secret_access_key` pair.
async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
        StorageKind::S3 => {
            let bucket = cfg.blob_bucket.clone().ok_or(object_store::Error::Generic {
                store: "AmazonS3",
                source: "blob_bucket must be set when storage = s3".into(),
            })?;
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(credentials) = &cfg.blob_credentials {
                if let Some((access_key_id, secret_access_key)) = credentials.split_once(':') {
                    builder = builder
                        .with_access_key_id(access_key_id)
                        .with_secret_access_key(secret_access_key);
                }
            }
            let store = builder.build()?;
            Ok((Arc::new(store), None))
        }
    }
}

/// In-memory and local-filesystem storage managers for tests, so handler and
/// route tests exercise real `put`/`get`/`delete_prefix` behavior without
/// standing up S3.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use crate::utils::config::AppConfig;

    pub fn test_config_memory() -> AppConfig {
        AppConfig {
            storage: StorageKind::Memory,
            data_dir: "/tmp/unused".into(),
            ..Default::default()
        }
    }

    /// Wraps an in-memory `StorageManager`, for handler and route tests that
    /// need real `put`/`get`/`delete_prefix` behavior without standing up S3
    /// or touching disk.
    #[derive(Clone)]
    pub struct TestStorageManager {
        storage: StorageManager,
    }

    impl TestStorageManager {
        pub async fn new_memory() -> object_store::Result<Self> {
            let cfg = test_config_memory();
            let storage = StorageManager::new(&cfg).await?;
            Ok(Self { storage })
        }

        pub fn storage(&self) -> &StorageManager {
            &self.storage
        }

        pub async fn put(&self, blob_path: &str, data: &[u8]) -> object_store::Result<()> {
            self.storage.put(blob_path, Bytes::from(data.to_vec())).await
        }

        pub async fn get(&self, blob_path: &str) -> object_store::Result<Bytes> {
            self.storage.get(blob_path).await
        }

        pub async fn delete_prefix(&self, prefix: &str) -> object_store::Result<()> {
            self.storage.delete_prefix(prefix).await
        }

        pub async fn exists(&self, blob_path: &str) -> object_store::Result<bool> {
            self.storage.exists(blob_path).await
        }

        pub async fn list(
            &self,
            prefix: Option<&str>,
        ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
            self.storage.list(prefix).await
        }
    }
}

/// Resolves `cfg.data_dir` to an absolute path, against the current working
/// directory when relative.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

/// Splits a logical blob path `"deal_1/doc_9/report.pdf"` into
/// `("deal_1/doc_9", "report.pdf")`, for scoping a delete to a document's
/// own prefix.
pub fn split_object_path(path: &str) -> AnyResult<(String, String)> {
    path.rsplit_once('/')
        .map(|(p, f)| (p.to_string(), f.to_string()))
        .ok_or_else(|| anyhow!("blob path has no separator: {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{test_config_memory, TestStorageManager};
    use bytes::Bytes;
    use uuid::Uuid;

    fn test_config_local(root: &str) -> AppConfig {
        AppConfig {
            storage: StorageKind::Local,
            data_dir: root.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn memory_backend_put_get_exists_delete_round_trip() {
        let storage = StorageManager::new(&test_config_memory())
            .await
            .expect("create storage manager");
        assert!(storage.local_base_path().is_none());

        let blob_path = "deal_1/doc_1/file.txt";
        let data = b"deal document bytes";

        storage.put(blob_path, Bytes::from(data.to_vec())).await.expect("put");
        let retrieved = storage.get(blob_path).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);
        assert!(storage.exists(blob_path).await.expect("exists check"));

        storage.delete_prefix("deal_1/doc_1/").await.expect("delete");
        assert!(!storage.exists(blob_path).await.expect("exists check after delete"));
    }

    #[tokio::test]
    async fn local_backend_persists_to_disk_and_cleans_up_empty_directories() {
        let base = format!("/tmp/crate_store_test_{}", Uuid::new_v4());
        let cfg = test_config_local(&base);
        let storage = StorageManager::new(&cfg).await.expect("create storage manager");
        let resolved_base = storage.local_base_path().expect("resolved base dir").to_path_buf();
        assert_eq!(resolved_base, PathBuf::from(&base));

        let blob_path = "deal_2/doc_1/file.txt";
        let data = b"deal document bytes on disk";

        storage.put(blob_path, Bytes::from(data.to_vec())).await.expect("put");
        let retrieved = storage.get(blob_path).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);

        let object_dir = resolved_base.join("deal_2/doc_1");
        tokio::fs::metadata(&object_dir).await.expect("object directory exists after write");

        storage.delete_prefix("deal_2/doc_1/").await.expect("delete");
        assert!(tokio::fs::metadata(&object_dir).await.is_err(), "object directory should be removed");
        tokio::fs::metadata(&resolved_base).await.expect("base directory remains intact");

        let _ = tokio::fs::remove_dir_all(&base).await;
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let storage = StorageManager::new(&test_config_memory()).await.expect("create storage manager");

        let files = [
            ("deal_1/doc_1/page_1.txt", b"content1" as &[u8]),
            ("deal_1/doc_1/page_2.txt", b"content2"),
            ("deal_1/doc_2/page_1.txt", b"content3"),
        ];
        for (blob_path, data) in files {
            storage.put(blob_path, Bytes::from(data.to_vec())).await.expect("put");
        }

        let all_files = storage.list(None).await.expect("list all");
        assert_eq!(all_files.len(), 3);

        let doc_1_files = storage.list(Some("deal_1/doc_1/")).await.expect("list doc_1");
        assert_eq!(doc_1_files.len(), 2);

        let empty = storage.list(Some("deal_9/nonexistent/")).await.expect("list nonexistent");
        assert_eq!(empty.len(), 0);
    }

    #[tokio::test]
    async fn get_on_missing_blob_path_errors_without_panicking() {
        let storage = StorageManager::new(&test_config_memory()).await.expect("create storage manager");

        assert!(storage.get("deal_1/doc_missing/file.txt").await.is_err());
        assert!(!storage.exists("deal_1/doc_missing/file.txt").await.expect("exists check"));
    }

    #[tokio::test]
    async fn test_storage_manager_round_trips_through_put_get_list_delete() {
        let test_storage = TestStorageManager::new_memory().await.expect("create test storage");

        let blob_path = "deal_1/doc_1/page.txt";
        let data = b"test data with TestStorageManager";

        test_storage.put(blob_path, data).await.expect("put");
        let retrieved = test_storage.get(blob_path).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);
        assert!(test_storage.exists(blob_path).await.expect("exists"));

        let files = test_storage.list(Some("deal_1/doc_1/")).await.expect("list");
        assert_eq!(files.len(), 1);

        test_storage.delete_prefix("deal_1/doc_1/").await.expect("delete");
        assert!(!test_storage.exists(blob_path).await.expect("exists after delete"));
    }

    #[tokio::test]
    async fn two_test_storage_managers_do_not_share_state() {
        let storage1 = TestStorageManager::new_memory().await.expect("create test storage 1");
        let storage2 = TestStorageManager::new_memory().await.expect("create test storage 2");

        let blob_path = "deal_1/doc_1/isolation.txt";
        storage1.put(blob_path, b"storage 1 data").await.expect("put storage 1");
        storage2.put(blob_path, b"storage 2 data").await.expect("put storage 2");

        assert_eq!(storage1.get(blob_path).await.expect("get storage 1").as_ref(), b"storage 1 data");
        assert_eq!(storage2.get(blob_path).await.expect("get storage 2").as_ref(), b"storage 2 data");
    }
}
