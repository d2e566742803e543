//! badger: feeds compressed database logs from object storage to pgbadger.
//!
//! Two handlers share this crate:
//!
//! - the collector, triggered by a queue message wrapping storage
//!   notifications. It downloads the notified objects, decompresses them,
//!   runs pgbadger incrementally over the batch and deletes the sources once
//!   the reports are updated.
//! - the stream transformer, which flattens gzip/base64 log subscription
//!   batches into plain log lines for a delivery stream.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use badger::{Config, LocalCommandRunner, StorageProvider, TriggerEvent, run_collector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(StorageProvider::from_config(&config.storage));
//!     let event = TriggerEvent::from_json(&std::fs::read_to_string("event.json")?)?;
//!     let outcome = run_collector(&config, storage, Arc::new(LocalCommandRunner), &event).await?;
//!     println!("{}", outcome.body);
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod transform;

pub use analyzer::{Analyzer, CommandRunner, CommandRunnerRef, LocalCommandRunner};
pub use config::Config;
pub use pipeline::{Collector, Outcome, run_collector};
pub use source::{ObjectNotification, TriggerEvent};
pub use storage::{ObjectStorage, ObjectStorageRef, StorageProvider};
pub use transform::{DeliveryBatch, TransformedBatch, transform};
