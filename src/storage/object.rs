use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore, PutMode, PutOptions, PutPayload};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{LocusError, Result};

/// Wrapper around the `object_store` crate providing a unified interface for
/// the S3 and local-filesystem backends. Partition and index blobs are whole
/// objects; a single `put` is the atomicity unit for partition overwrites.
#[derive(Clone)]
pub struct LocusStore {
    inner: Arc<dyn ObjectStore>,
}

impl LocusStore {
    /// Create a new store from configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::S3 => {
                let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);

                if let Some(ref region) = config.s3_region {
                    builder = builder.with_region(region);
                }
                if let Some(ref endpoint) = config.s3_endpoint {
                    if !endpoint.is_empty() {
                        builder = builder.with_endpoint(endpoint);
                    }
                }
                if let Some(ref key_id) = config.s3_access_key_id {
                    builder = builder.with_access_key_id(key_id);
                }
                if let Some(ref secret) = config.s3_secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }
                if config.s3_allow_http {
                    builder = builder.with_allow_http(true);
                }

                let client_options = ClientOptions::new()
                    .with_timeout(std::time::Duration::from_secs(30))
                    .with_connect_timeout(std::time::Duration::from_secs(10));
                builder = builder.with_client_options(client_options);

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| LocusError::Config(format!("failed to build S3 store: {e}")))?,
                )
            }
            StorageBackend::Local => {
                let path = std::path::Path::new(&config.bucket);
                if !path.exists() {
                    std::fs::create_dir_all(path)?;
                }
                Arc::new(
                    object_store::local::LocalFileSystem::new_with_prefix(path).map_err(|e| {
                        LocusError::Config(format!("failed to build local store: {e}"))
                    })?,
                )
            }
        };

        Ok(Self { inner: store })
    }

    /// Create a store directly from an ObjectStore instance (for testing).
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { inner: store }
    }

    /// Put an object at the given key. Whole-object put is atomic on both
    /// backends (local uses write-then-rename).
    #[instrument(skip(self, data), fields(key = key, size = data.len()))]
    pub async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let start = std::time::Instant::now();
        let path = Path::parse(key)?;
        self.inner
            .put(&path, PutPayload::from(data))
            .await
            .map_err(|e| {
                crate::metrics::STORE_ERRORS_TOTAL
                    .with_label_values(&["put"])
                    .inc();
                LocusError::Storage(e)
            })?;
        let elapsed = start.elapsed();
        debug!(elapsed_ms = elapsed.as_millis(), "store put");
        crate::metrics::STORE_OPERATION_DURATION
            .with_label_values(&["put"])
            .observe(elapsed.as_secs_f64());
        Ok(())
    }

    /// Get an object by key. Returns NotFound if it doesn't exist.
    #[instrument(skip(self), fields(key = key))]
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let start = std::time::Instant::now();
        let path = Path::parse(key)?;
        let result = self.inner.get(&path).await.map_err(|e| {
            crate::metrics::STORE_ERRORS_TOTAL
                .with_label_values(&["get"])
                .inc();
            match e {
                object_store::Error::NotFound { path, .. } => LocusError::NotFound {
                    key: path.to_string(),
                },
                other => LocusError::Storage(other),
            }
        })?;
        let bytes = result.bytes().await?;
        let elapsed = start.elapsed();
        debug!(
            elapsed_ms = elapsed.as_millis(),
            size = bytes.len(),
            "store get"
        );
        crate::metrics::STORE_OPERATION_DURATION
            .with_label_values(&["get"])
            .observe(elapsed.as_secs_f64());
        Ok(bytes)
    }

    /// Put an object only if it does NOT already exist (atomic create).
    /// Returns `ProjectAlreadyExists` if the key already exists.
    #[instrument(skip(self, data), fields(key = key))]
    pub async fn put_if_not_exists(&self, key: &str, data: Bytes, project: &str) -> Result<()> {
        let start = std::time::Instant::now();
        let path = Path::parse(key)?;
        let options = PutOptions {
            mode: PutMode::Create,
            ..PutOptions::default()
        };
        self.inner
            .put_opts(&path, PutPayload::from(data), options)
            .await
            .map_err(|e| match e {
                object_store::Error::AlreadyExists { path, .. } => {
                    debug!(key = %path, "put_if_not_exists: object already exists");
                    LocusError::ProjectAlreadyExists {
                        project: project.to_string(),
                    }
                }
                other => {
                    crate::metrics::STORE_ERRORS_TOTAL
                        .with_label_values(&["put"])
                        .inc();
                    LocusError::Storage(other)
                }
            })?;
        let elapsed = start.elapsed();
        debug!(elapsed_ms = elapsed.as_millis(), "store put_if_not_exists");
        crate::metrics::STORE_OPERATION_DURATION
            .with_label_values(&["put"])
            .observe(elapsed.as_secs_f64());
        Ok(())
    }

    /// Delete an object by key.
    #[instrument(skip(self), fields(key = key))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = Path::parse(key)?;
        self.inner.delete(&path).await?;
        Ok(())
    }

    /// List objects under a prefix.
    #[instrument(skip(self), fields(prefix = prefix))]
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let start = std::time::Instant::now();
        use futures::TryStreamExt;
        let path = Path::parse(prefix)?;
        let stream = self.inner.list(Some(&path));
        let objects: Vec<_> = stream.try_collect().await?;
        let keys: Vec<String> = objects.iter().map(|o| o.location.to_string()).collect();
        let elapsed = start.elapsed();
        debug!(
            elapsed_ms = elapsed.as_millis(),
            count = keys.len(),
            "store list_prefix"
        );
        crate::metrics::STORE_OPERATION_DURATION
            .with_label_values(&["list_prefix"])
            .observe(elapsed.as_secs_f64());
        Ok(keys)
    }

    /// Check if an object exists.
    #[instrument(skip(self), fields(key = key))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = Path::parse(key)?;
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => {
                crate::metrics::STORE_ERRORS_TOTAL
                    .with_label_values(&["exists"])
                    .inc();
                Err(LocusError::Storage(e))
            }
        }
    }

    /// Delete all objects under a prefix (for cleanup).
    #[instrument(skip(self), fields(prefix = prefix))]
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list_prefix(prefix).await?;
        let count = keys.len();
        let inner = &self.inner;
        let delete_futs: Vec<_> = keys
            .iter()
            .map(|key| async move {
                let path = Path::parse(key)?;
                inner.delete(&path).await?;
                Ok::<_, LocusError>(())
            })
            .collect();
        let results = futures::future::join_all(delete_futs).await;
        for result in results {
            result?;
        }
        debug!(count, "store delete_prefix");
        Ok(count)
    }
}
