//! S3 storage backend implementation.

use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{S3ConfigSnafu, StorageError};

/// S3 storage configuration shared by every bucket the collector touches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Extra `object_store` options (`aws_access_key_id`, `aws_session_token`, ...).
    pub options: HashMap<String, String>,
}

/// Create a standard retry configuration for cloud storage operations.
fn default_retry_config() -> RetryConfig {
    RetryConfig::default()
}

impl S3Config {
    /// Build a client for one bucket. Credentials come from the environment.
    pub(super) fn build(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        for (key, value) in &self.options {
            builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value.clone());
        }

        builder = builder.with_retry(default_retry_config());

        if let Some(region) = &self.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &self.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        Ok(Arc::new(builder.build().context(S3ConfigSnafu)?))
    }
}
