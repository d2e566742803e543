//! Materializes one storage object as a plaintext file in the working set.

use bytes::Bytes;
use snafu::prelude::*;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

use crate::emit;
use crate::error::{
    DecompressSnafu, DecompressTaskSnafu, DecompressionError, DownloadSnafu, FetchError,
    InvalidKeySnafu, NameCollisionSnafu, WriteFileSnafu,
};
use crate::metrics::events::{
    DecompressionCompleted, DecompressionLayer, LayerOutcome, ObjectFetched,
};
use crate::pipeline::workspace::Workspace;
use crate::source::{GzipCodec, Layer};
use crate::storage::ObjectStorageRef;

/// File name an object is stored under in the working set.
///
/// This is the last segment of the key. Keys without a usable last segment
/// (empty, `.` or `..`) cannot be placed in the working set.
pub fn destination_name(key: &str) -> Option<&str> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// Name the file would have after a `gunzip` of `name`.
fn inflated_name(name: &str) -> &str {
    name.strip_suffix(".gz").unwrap_or(name)
}

/// Working-set file names already claimed in one batch, with their keys.
///
/// An object occupies both its destination name and the name a `gunzip`
/// would give it. Two keys sharing either one would overwrite each other.
#[derive(Debug, Default)]
pub struct ClaimedNames {
    owners: HashMap<String, String>,
}

impl ClaimedNames {
    /// Reserve the names `key` will use, or fail if another key holds one.
    pub fn claim(&mut self, key: &str) -> Result<(), FetchError> {
        let name = destination_name(key).context(InvalidKeySnafu { key })?;
        let names = [name, inflated_name(name)];

        for name in names {
            if let Some(other) = self.owners.get(name) {
                return NameCollisionSnafu {
                    key,
                    name,
                    other: other.as_str(),
                }
                .fail();
            }
        }
        for name in names {
            self.owners.insert(name.to_string(), key.to_string());
        }
        Ok(())
    }
}

/// Downloads objects and leaves them decompressed under `logs/`.
#[derive(Clone)]
pub struct ObjectFetcher {
    storage: ObjectStorageRef,
    codec: GzipCodec,
}

impl ObjectFetcher {
    pub fn new(storage: ObjectStorageRef) -> Self {
        Self {
            storage,
            codec: GzipCodec,
        }
    }

    /// Fetch `bucket/key` into the working set and return the plaintext path.
    ///
    /// The file keeps the key's file name, `.gz` suffix included, whatever
    /// its compression state was. Files left by an earlier attempt at the
    /// same key are replaced.
    pub async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        workspace: &Workspace,
    ) -> Result<PathBuf, FetchError> {
        let name = destination_name(key).context(InvalidKeySnafu { key })?;
        let logs_dir = workspace.logs_dir();
        let destination = logs_dir.join(name);
        let inflated = logs_dir.join(inflated_name(name));

        for path in [&destination, &inflated] {
            remove_if_exists(path).await?;
        }

        let start = Instant::now();
        let compressed = self
            .storage
            .download(bucket, key)
            .await
            .context(DownloadSnafu { bucket, key })?;
        let size = compressed.len() as u64;
        debug!("Downloaded s3://{}/{} ({} bytes)", bucket, key, size);

        let decompress_start = Instant::now();
        let codec = self.codec;
        let plaintext = tokio::task::spawn_blocking(move || inflate(codec, compressed))
            .await
            .context(DecompressTaskSnafu)?
            .context(DecompressSnafu { key })?;
        emit!(DecompressionCompleted {
            duration: decompress_start.elapsed()
        });

        tokio::fs::write(&inflated, &plaintext)
            .await
            .context(WriteFileSnafu { path: &inflated })?;
        if inflated != destination {
            tokio::fs::rename(&inflated, &destination)
                .await
                .context(WriteFileSnafu { path: &destination })?;
        }

        emit!(ObjectFetched {
            bytes: size,
            duration: start.elapsed(),
        });
        debug!(
            "Materialized {} ({} bytes plaintext)",
            destination.display(),
            plaintext.len()
        );
        Ok(destination)
    }
}

/// Remove the mandatory gzip layer, then a second one if the object was
/// compressed twice.
fn inflate(codec: GzipCodec, compressed: Bytes) -> Result<Vec<u8>, DecompressionError> {
    let once = codec.decompress(&compressed)?;
    emit!(DecompressionLayer {
        outcome: LayerOutcome::Compressed
    });

    match codec.peel(&once) {
        Ok(Layer::Compressed(twice)) => {
            emit!(DecompressionLayer {
                outcome: LayerOutcome::Compressed
            });
            debug!("Object was compressed twice");
            Ok(twice)
        }
        Ok(Layer::AlreadyPlain) => {
            emit!(DecompressionLayer {
                outcome: LayerOutcome::AlreadyPlain
            });
            Ok(once)
        }
        Err(e) => {
            emit!(DecompressionLayer {
                outcome: LayerOutcome::Corrupt
            });
            warn!("Inner gzip layer could not be inflated, keeping content as-is: {e}");
            Ok(once)
        }
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), FetchError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed previous download {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(WriteFileSnafu { path }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_name() {
        assert_eq!(
            destination_name("error/postgresql.log.2024-01-15-10.gz"),
            Some("postgresql.log.2024-01-15-10.gz")
        );
        assert_eq!(destination_name("flat.gz"), Some("flat.gz"));
        assert_eq!(destination_name("dir/"), None);
        assert_eq!(destination_name(""), None);
        assert_eq!(destination_name("a/.."), None);
    }

    #[test]
    fn test_inflated_name() {
        assert_eq!(inflated_name("postgresql.log.gz"), "postgresql.log");
        assert_eq!(inflated_name("postgresql.log"), "postgresql.log");
    }

    #[test]
    fn test_claimed_names_reject_shared_file_names() {
        let mut names = ClaimedNames::default();
        names.claim("x/foo").unwrap();

        let err = names.claim("y/foo.gz").unwrap_err();
        match err {
            FetchError::NameCollision { key, name, other } => {
                assert_eq!(key, "y/foo.gz");
                assert_eq!(name, "foo");
                assert_eq!(other, "x/foo");
            }
            other => panic!("expected NameCollision, got {other:?}"),
        }

        names.claim("a/bar.gz").unwrap();
        assert!(names.claim("b/bar.gz").is_err());
        assert!(names.claim("c/bar").is_err());
        names.claim("c/baz.gz").unwrap();
        assert!(matches!(
            names.claim("dir/"),
            Err(FetchError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_inflate_single_and_double() {
        let text = b"LOG:  statement: select 1\n";
        let once = GzipCodec.compress(text).unwrap();
        let twice = GzipCodec.compress(&once).unwrap();

        assert_eq!(
            inflate(GzipCodec, Bytes::from(once)).unwrap(),
            text.to_vec()
        );
        assert_eq!(
            inflate(GzipCodec, Bytes::from(twice)).unwrap(),
            text.to_vec()
        );
    }

    #[test]
    fn test_inflate_requires_outer_layer() {
        let err = inflate(GzipCodec, Bytes::from_static(b"plain text")).unwrap_err();
        assert!(matches!(err, DecompressionError::Gzip { .. }));
    }

    #[test]
    fn test_inflate_tolerates_corrupt_inner_layer() {
        let inner = GzipCodec.compress(b"payload").unwrap();
        let truncated = inner[..inner.len() - 4].to_vec();
        let outer = GzipCodec.compress(&truncated).unwrap();

        assert_eq!(inflate(GzipCodec, Bytes::from(outer)).unwrap(), truncated);
    }
}
