//! Decoding of what arrives from the trigger source.
//!
//! - `event`: the queue/notification document and its normalization
//! - `key`: percent-escape decoding of notification keys
//! - `compression`: gzip layer handling for fetched objects and stream payloads

pub mod compression;
pub mod event;
pub mod key;

pub use compression::{GzipCodec, Layer};
pub use event::{ObjectNotification, TriggerEvent};
