//! Collector configuration.
//!
//! In production the collector is configured entirely from the environment
//! (`BADGER_OUTPUT_DIR`, `BADGER_OUTPUT_FILE`, `BADGER_INPUT_FILE`). For
//! local runs a YAML file can be used instead; it supports `${VAR}`
//! interpolation so secrets stay in the environment.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{
    ConfigError, EnvInterpolationSnafu, MissingOutputDirSnafu, ReadFileSnafu, YamlParseSnafu,
};

/// Environment variable naming the persistent report directory.
pub const OUTPUT_DIR_VAR: &str = "BADGER_OUTPUT_DIR";
/// Environment variable naming the report output file.
pub const OUTPUT_FILE_VAR: &str = "BADGER_OUTPUT_FILE";
/// Environment variable naming a local log file to analyze instead of the event.
pub const INPUT_FILE_VAR: &str = "BADGER_INPUT_FILE";

/// Main configuration structure for the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-invocation scratch directory. Destroyed at the start and end of every run.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Persistent report directory. Only ever created, never removed.
    #[serde(default)]
    pub output_dir: PathBuf,

    /// Report file name handed to the analyzer.
    #[serde(default)]
    pub output_file: Option<String>,

    /// Debug override: analyze this local file and ignore the trigger event.
    #[serde(default)]
    pub input_file: Option<PathBuf>,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// How to run the external analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Path to the pgbadger executable (default: "/opt/badger/pgbadger").
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Input log format passed with `-f` (default: "rds").
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            log_format: default_log_format(),
        }
    }
}

/// Object storage settings. Credentials are read from the standard AWS
/// environment by the S3 client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint (S3-compatible stores, localstack).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Serve buckets from directories under this path instead of S3.
    #[serde(default)]
    pub local_root: Option<PathBuf>,

    /// Extra client options (aws_access_key_id, aws_session_token, ...).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/pgbadger-work")
}

fn default_program() -> PathBuf {
    PathBuf::from("/opt/badger/pgbadger")
}

fn default_log_format() -> String {
    "rds".to_string()
}

impl Config {
    /// Build a configuration with defaults for everything but the output dir.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: default_work_dir(),
            output_dir: output_dir.into(),
            output_file: None,
            input_file: None,
            analyzer: AnalyzerConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from variables resolved through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let mut config = Self::new(var(OUTPUT_DIR_VAR).unwrap_or_default());
        config.output_file = var(OUTPUT_FILE_VAR);
        config.input_file = var(INPUT_FILE_VAR).map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, substituting `${VAR}` references
    /// from the environment first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        match vars::interpolate(&content, |name| std::env::var(name).ok()) {
            Ok(content) => Self::from_yaml(&content),
            Err(errors) => EnvInterpolationSnafu {
                message: errors.join("\n"),
            }
            .fail(),
        }
    }

    /// Parse and validate an already-interpolated YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.output_dir.as_os_str().is_empty(),
            MissingOutputDirSnafu
        );
        Ok(())
    }
}
