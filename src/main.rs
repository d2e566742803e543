//! badger: command-line entry point for the collector and the stream
//! transformer.
//!
//! Each subcommand reads one JSON document (a file, or `-` for stdin) and
//! writes the handler's JSON response to stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use badger::config::Config;
use badger::error::{
    CliError, CollectSnafu, ConfigSnafu, ParseInputSnafu, ReadInputSnafu, WriteOutputSnafu,
};
use badger::{DeliveryBatch, LocalCommandRunner, StorageProvider, TriggerEvent};

/// Feeds database logs from object storage to pgbadger.
#[derive(Parser, Debug)]
#[command(name = "badger")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one trigger event: fetch, analyze, clean up.
    Collect {
        /// Trigger event JSON, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        event: String,

        /// YAML configuration file. Without it the environment is used.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the per-invocation work dir.
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Transform one delivery-stream batch.
    Transform {
        /// Delivery batch JSON, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        input: String,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Collect {
            event,
            config,
            work_dir,
        } => collect(&event, config, work_dir).await,
        Command::Transform { input } => transform(&input).await,
    }
}

async fn collect(
    event: &str,
    config_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut config = build_config(config_path)?;
    if let Some(work_dir) = work_dir {
        config.work_dir = work_dir;
    }
    debug!(
        "Work dir {}, output dir {}",
        config.work_dir.display(),
        config.output_dir.display()
    );

    let text = read_input(event).await?;
    let event: TriggerEvent = serde_json::from_str(&text).context(ParseInputSnafu)?;
    info!("Received event with {} message(s)", event.records.len());

    let storage = Arc::new(StorageProvider::from_config(&config.storage));
    let runner = Arc::new(LocalCommandRunner);
    let outcome = badger::run_collector(&config, storage, runner, &event)
        .await
        .context(CollectSnafu)?;

    print_json(&outcome)
}

async fn transform(input: &str) -> Result<(), CliError> {
    let text = read_input(input).await?;
    let batch: DeliveryBatch = serde_json::from_str(&text).context(ParseInputSnafu)?;
    info!("Transforming {} record(s)", batch.records.len());

    print_json(&badger::transform(&batch))
}

/// Config from a YAML file when given, from the environment otherwise.
fn build_config(path: Option<PathBuf>) -> Result<Config, CliError> {
    match path {
        Some(path) => Config::from_file(&path).context(ConfigSnafu),
        None => Config::from_env().context(ConfigSnafu),
    }
}

async fn read_input(input: &str) -> Result<String, CliError> {
    let mut text = String::new();
    if input == "-" {
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context(ReadInputSnafu { input })?;
    } else {
        text = tokio::fs::read_to_string(input)
            .await
            .context(ReadInputSnafu { input })?;
    }
    Ok(text)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string(value).context(WriteOutputSnafu)?;
    println!("{json}");
    Ok(())
}
