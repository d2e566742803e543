//! Delivery-stream record transformer.
//!
//! Each incoming record holds a base64, gzip-compressed batch of log events
//! as produced by a log subscription. The transformer rewrites it as the
//! plain event messages, one per line, compressed and encoded the same way.
//!
//! The output always has exactly one record per input record, in the same
//! order and with the same `recordId`. A record that cannot be decoded is
//! returned with `ProcessingFailed` and its original data.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::emit;
use crate::error::{
    Base64DecodeSnafu, CompressSnafu, PayloadDecompressSnafu, PayloadSnafu, TransformError,
};
use crate::metrics::events::RecordTransformed;
use crate::source::GzipCodec;

/// `messageType` of the health-check batches a subscription sends.
pub const CONTROL_MESSAGE: &str = "CONTROL_MESSAGE";

/// Records handed to the transformer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryBatch {
    #[serde(default)]
    pub records: Vec<DeliveryRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub record_id: String,
    /// base64(gzip(JSON log event batch))
    pub data: String,
}

/// Records returned to the delivery stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedBatch {
    pub records: Vec<TransformedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedRecord {
    pub record_id: String,
    pub result: RecordResult,
    /// base64(gzip(text)) on `Ok`, the untouched input otherwise.
    pub data: String,
}

/// Per-record status understood by the delivery stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordResult {
    Ok,
    Dropped,
    ProcessingFailed,
}

impl RecordResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordResult::Ok => "Ok",
            RecordResult::Dropped => "Dropped",
            RecordResult::ProcessingFailed => "ProcessingFailed",
        }
    }
}

/// The decompressed payload of one record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEventBatch {
    #[serde(default)]
    message_type: Option<String>,
    log_events: Vec<LogEvent>,
}

#[derive(Debug, Clone, Deserialize)]
struct LogEvent {
    message: String,
}

/// What a well-formed payload turned into.
enum Flattened {
    Lines(String),
    Control,
}

/// Transform every record of `batch`.
pub fn transform(batch: &DeliveryBatch) -> TransformedBatch {
    let records: Vec<TransformedRecord> = batch.records.iter().map(transform_record).collect();
    debug!("Transformed {} record(s)", records.len());
    TransformedBatch { records }
}

/// Transform a single record. Never fails; problems are reported in `result`.
pub fn transform_record(record: &DeliveryRecord) -> TransformedRecord {
    let (result, data) = match reencode(&record.data) {
        Ok(Some(data)) => (RecordResult::Ok, data),
        Ok(None) => (RecordResult::Dropped, record.data.clone()),
        Err(e) => {
            warn!(
                "Record {} could not be transformed: {}",
                record.record_id,
                snafu::Report::from_error(&e)
            );
            (RecordResult::ProcessingFailed, record.data.clone())
        }
    };

    emit!(RecordTransformed {
        result: result.as_str()
    });
    TransformedRecord {
        record_id: record.record_id.clone(),
        result,
        data,
    }
}

/// Decode, flatten and re-encode one payload. `None` for control messages.
fn reencode(data: &str) -> Result<Option<String>, TransformError> {
    let codec = GzipCodec;
    let compressed = STANDARD.decode(data).context(Base64DecodeSnafu)?;
    let payload = codec
        .decompress(&compressed)
        .context(PayloadDecompressSnafu)?;

    let text = match flatten(&payload)? {
        Flattened::Lines(text) => text,
        Flattened::Control => return Ok(None),
    };

    let compressed = codec.compress(text.as_bytes()).context(CompressSnafu)?;
    Ok(Some(STANDARD.encode(compressed)))
}

/// Join event messages with newlines, with a trailing newline.
fn flatten(payload: &[u8]) -> Result<Flattened, TransformError> {
    let batch: LogEventBatch = serde_json::from_slice(payload).context(PayloadSnafu)?;
    if batch.message_type.as_deref() == Some(CONTROL_MESSAGE) {
        return Ok(Flattened::Control);
    }

    let mut text = batch
        .log_events
        .iter()
        .map(|event| event.message.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    text.push('\n');
    Ok(Flattened::Lines(text))
}
