//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a handler
//! invocation. Events implement the `InternalEvent` trait which records the
//! corresponding counter or histogram.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Terminal status of an invocation or analyzer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Skipped,
    Failed,
}

impl RunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a collector invocation reaches a terminal state.
pub struct InvocationCompleted {
    pub status: RunStatus,
}

impl InternalEvent for InvocationCompleted {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Invocation completed");
        counter!("badger_invocations_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when an object has been materialized in the working set.
pub struct ObjectFetched {
    pub bytes: u64,
    pub duration: Duration,
}

impl InternalEvent for ObjectFetched {
    fn emit(self) {
        trace!(
            bytes = self.bytes,
            duration_ms = self.duration.as_millis(),
            "Object fetched"
        );
        counter!("badger_objects_fetched_total").increment(1);
        counter!("badger_bytes_fetched_total").increment(self.bytes);
        histogram!("badger_fetch_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when processed source objects are removed from storage.
pub struct ObjectsDeleted {
    pub count: u64,
}

impl InternalEvent for ObjectsDeleted {
    fn emit(self) {
        trace!(count = self.count, "Objects deleted");
        counter!("badger_objects_deleted_total").increment(self.count);
    }
}

/// Result of one decompression pass over a fetched object.
#[derive(Debug, Clone, Copy)]
pub enum LayerOutcome {
    Compressed,
    AlreadyPlain,
    Corrupt,
}

impl LayerOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LayerOutcome::Compressed => "compressed",
            LayerOutcome::AlreadyPlain => "already_plain",
            LayerOutcome::Corrupt => "corrupt",
        }
    }
}

/// Event emitted after each decompression pass.
pub struct DecompressionLayer {
    pub outcome: LayerOutcome,
}

impl InternalEvent for DecompressionLayer {
    fn emit(self) {
        trace!(outcome = self.outcome.as_str(), "Decompression layer");
        counter!("badger_decompression_layers_total", "outcome" => self.outcome.as_str())
            .increment(1);
    }
}

/// Event emitted when decompression of one object completes.
pub struct DecompressionCompleted {
    pub duration: Duration,
}

impl InternalEvent for DecompressionCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Decompression completed"
        );
        histogram!("badger_decompression_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when the analyzer exits.
pub struct AnalysisCompleted {
    pub status: RunStatus,
    pub duration: Duration,
}

impl InternalEvent for AnalysisCompleted {
    fn emit(self) {
        trace!(
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Analysis completed"
        );
        counter!("badger_analysis_runs_total", "status" => self.status.as_str()).increment(1);
        histogram!("badger_analysis_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted for each record leaving the stream transformer.
pub struct RecordTransformed {
    pub result: &'static str,
}

impl InternalEvent for RecordTransformed {
    fn emit(self) {
        trace!(result = self.result, "Record transformed");
        counter!("badger_records_transformed_total", "result" => self.result).increment(1);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Delete,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Delete => "delete",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request"
        );
        counter!(
            "badger_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "badger_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
