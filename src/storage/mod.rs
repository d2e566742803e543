//! Object storage access for the collector.
//!
//! The collector only ever downloads and deletes whole objects, so the
//! interface it depends on is the narrow [`ObjectStorage`] trait. The
//! production implementation, [`StorageProvider`], routes each bucket to an
//! `object_store` backend (S3, or a local directory tree for development
//! and tests) and caches one client per bucket.

mod local;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

use crate::config::StorageConfig;
use crate::emit;
use crate::error::{InvalidBucketSnafu, InvalidObjectKeySnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

pub use local::LocalConfig;
pub use s3::S3Config;

/// Operations the collector needs from object storage.
///
/// Both operations are expected to fail loudly; a partial download is never
/// reported as success.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch the full contents of `bucket/key`.
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Remove `bucket/key`.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

/// A shared handle to an [`ObjectStorage`] implementation.
pub type ObjectStorageRef = Arc<dyn ObjectStorage>;

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Pick the backend described by the storage section of the config.
    pub fn from_config(config: &StorageConfig) -> Self {
        match &config.local_root {
            Some(root) => BackendConfig::Local(LocalConfig { root: root.clone() }),
            None => BackendConfig::S3(S3Config {
                endpoint: config.endpoint.clone(),
                region: config.region.clone(),
                options: config.options.clone(),
            }),
        }
    }
}

/// Storage provider that lazily builds one `object_store` client per bucket.
pub struct StorageProvider {
    config: BackendConfig,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{:?}>", self.config)
    }
}

impl StorageProvider {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Create a provider from the storage section of the config.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(BackendConfig::from_config(config))
    }

    /// Serve `bucket` from an already-built store instead of the backend.
    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .insert(bucket.into(), store);
        self
    }

    /// Return the cached client for `bucket`, building it on first use.
    async fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        ensure!(
            !bucket.is_empty() && !bucket.contains('/'),
            InvalidBucketSnafu { bucket }
        );

        if let Some(store) = self.cached(bucket) {
            return Ok(store);
        }

        let store = match &self.config {
            BackendConfig::S3(config) => config.build(bucket)?,
            BackendConfig::Local(config) => config.build(bucket).await?,
        };
        debug!("Built storage client for bucket {}", bucket);

        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        Ok(stores.entry(bucket.to_string()).or_insert(store).clone())
    }

    fn cached(&self, bucket: &str) -> Option<Arc<dyn ObjectStore>> {
        self.stores
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(bucket)
            .cloned()
    }
}

/// The object path for a literal key.
///
/// The key is used byte for byte. Keys that are not valid object paths,
/// such as `a//b.gz`, are rejected rather than normalized into another key.
pub fn object_path(key: &str) -> Result<Path, StorageError> {
    Path::parse(key).context(InvalidObjectKeySnafu { key })
}

#[async_trait]
impl ObjectStorage for StorageProvider {
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let path = object_path(key)?;
        let store = self.store_for(bucket).await?;
        let start = Instant::now();

        let result = match store.get(&path).await {
            Ok(get) => get.bytes().await,
            Err(e) => Err(e),
        };
        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_result(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = object_path(key)?;
        let store = self.store_for(bucket).await?;
        let start = Instant::now();

        let result = store.delete(&path).await;
        emit!(StorageRequest {
            operation: StorageOperation::Delete,
            status: RequestStatus::from_result(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }
}
