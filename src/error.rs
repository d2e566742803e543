//! Error types for badger using snafu.
//!
//! Each stage of the collector has its own error enum so callers can tell a
//! malformed trigger apart from a storage outage or an analyzer failure.
//! Variant names are unique across the module because snafu generates the
//! context selectors in this namespace.

use std::path::PathBuf;

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during object storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Bucket name rejected before reaching the backend.
    #[snafu(display("Invalid bucket name: {bucket:?}"))]
    InvalidBucket { bucket: String },

    /// Key is not a valid object path (empty segment, control character, ...).
    #[snafu(display("Invalid object key: {key:?}"))]
    InvalidObjectKey {
        key: String,
        source: object_store::path::Error,
    },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error while preparing a storage backend.
    #[snafu(display("IO error"))]
    StorageIo { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Output directory is not configured.
    #[snafu(display("Output directory must be set (BADGER_OUTPUT_DIR or output_dir)"))]
    MissingOutputDir,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Event Errors ============

/// The trigger event is missing fields required to act on it.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EventError {
    /// The event document itself is not valid.
    #[snafu(display("Failed to parse trigger event"))]
    EventParse { source: serde_json::Error },

    /// A string-encoded notification body could not be decoded.
    #[snafu(display("Failed to decode notification body at index {index}"))]
    BodyParse {
        index: usize,
        source: serde_json::Error,
    },

    /// A notification wrapper has no body.
    #[snafu(display("Notification at index {index} has no body"))]
    MissingBody { index: usize },

    /// A notification record has no bucket name.
    #[snafu(display("Failed to get bucket name from notification at index {index}"))]
    MissingBucket { index: usize },

    /// A notification record has no object key.
    #[snafu(display("Failed to get key from notification at index {index} (bucket {bucket})"))]
    MissingKey { index: usize, bucket: String },
}

// ============ Decompression Errors ============

/// Errors that can occur while inflating a compressed payload.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecompressionError {
    /// Gzip stream is invalid or truncated.
    #[snafu(display("Gzip decompression failed"))]
    Gzip { source: std::io::Error },
}

// ============ Fetch Errors ============

/// Errors that can occur while materializing one object into the working set.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The key has no usable file name segment.
    #[snafu(display("Object key has no file name: {key:?}"))]
    InvalidKey { key: String },

    /// The object could not be downloaded.
    #[snafu(display("Failed to download s3://{bucket}/{key}"))]
    Download {
        bucket: String,
        key: String,
        source: StorageError,
    },

    /// The object was expected to be compressed but was not.
    #[snafu(display("Failed to decompress {key}"))]
    Decompress {
        key: String,
        source: DecompressionError,
    },

    /// Writing the plaintext file failed.
    #[snafu(display("Failed to write {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Two keys in one batch map to the same working-set file.
    #[snafu(display("Object key {key:?} would overwrite {name:?}, already taken by {other:?}"))]
    NameCollision {
        key: String,
        name: String,
        other: String,
    },

    /// The blocking decompression task panicked or was cancelled.
    #[snafu(display("Decompression task failed"))]
    DecompressTask { source: tokio::task::JoinError },
}

// ============ Workspace Errors ============

/// Errors that can occur while preparing or tearing down directories.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WorkspaceError {
    /// Failed to create a directory.
    #[snafu(display("Failed to create directory {}", path.display()))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to remove a directory.
    #[snafu(display("Failed to remove directory {}", path.display()))]
    RemoveDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to copy the override input file into the working set.
    #[snafu(display("Failed to copy input file {}", path.display()))]
    CopyInput {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Analysis Errors ============

/// Errors raised by the analyzer invocation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AnalysisError {
    /// The analyzer could not be started.
    #[snafu(display("Failed to run {}", program.display()))]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// The analyzer exited unsuccessfully.
    #[snafu(display("Analyzer exited with {}: {stderr}", exit_label(*code)))]
    ToolFailed { code: Option<i32>, stderr: String },

    /// The working set could not be listed.
    #[snafu(display("Failed to list log files in {}", path.display()))]
    ListLogs {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

// ============ Collect Error (top-level) ============

/// Top-level collector errors. Every variant aborts the batch.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CollectError {
    /// Workspace provisioning failed.
    #[snafu(display("Workspace error"))]
    Workspace { source: WorkspaceError },

    /// The trigger event is malformed.
    #[snafu(display("Malformed event"))]
    MalformedEvent { source: EventError },

    /// An object could not be fetched.
    #[snafu(display("Fetch error"))]
    Fetch { source: FetchError },

    /// The analyzer failed.
    #[snafu(display("Analysis error"))]
    Analysis { source: AnalysisError },

    /// A processed source object could not be deleted.
    #[snafu(display("Failed to delete processed object s3://{bucket}/{key}"))]
    DeleteSource {
        bucket: String,
        key: String,
        source: StorageError,
    },

    /// The resume state file could not be removed.
    #[snafu(display("Failed to remove resume state {}", path.display()))]
    ResumeState {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Transform Errors ============

/// Per-record failures inside the stream transformer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// Record data is not valid base64.
    #[snafu(display("Base64 decode error"))]
    Base64Decode { source: base64::DecodeError },

    /// Record data is not a valid gzip stream.
    #[snafu(display("Failed to decompress record data"))]
    PayloadDecompress { source: DecompressionError },

    /// Decompressed data is not a log event batch.
    #[snafu(display("Failed to parse log event batch"))]
    Payload { source: serde_json::Error },

    /// Re-compression failed.
    #[snafu(display("Failed to compress record data"))]
    Compress { source: std::io::Error },
}

// ============ CLI Errors ============

/// Errors surfaced by the command-line entry point.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Collector invocation failed.
    #[snafu(display("Collector failed"))]
    Collect { source: CollectError },

    /// Reading the input document failed.
    #[snafu(display("Failed to read input {input}"))]
    ReadInput {
        input: String,
        source: std::io::Error,
    },

    /// The input document is not valid JSON for the handler.
    #[snafu(display("Failed to parse input document"))]
    ParseInput { source: serde_json::Error },

    /// Writing the response document failed.
    #[snafu(display("Failed to write response"))]
    WriteOutput { source: serde_json::Error },
}
