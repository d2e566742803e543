//! Local filesystem storage backend implementation.
//!
//! Each bucket maps to a directory under `root`, which makes it possible to
//! run the collector against a directory tree that mirrors the buckets.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ObjectStoreSnafu, StorageError, StorageIoSnafu};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub root: PathBuf,
}

impl LocalConfig {
    pub(super) async fn build(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let path = self.root.join(bucket);
        tokio::fs::create_dir_all(&path)
            .await
            .context(StorageIoSnafu)?;

        Ok(Arc::new(
            LocalFileSystem::new_with_prefix(&path).context(ObjectStoreSnafu)?,
        ))
    }
}
