//! Collector pipeline.
//!
//! One invocation walks through a fixed sequence of stages:
//!
//! ```text
//! Init -> Provisioned -> Fetching -> Analyzing -> Finalizing
//!   any stage on failure ------------------------> Aborted
//! ```
//!
//! Source objects and the analyzer's resume state are only removed in
//! `Finalizing`, after the analyzer succeeded. Any failure before that leaves
//! both in place, so redelivering the same trigger repeats the whole batch
//! safely. The work dir is removed on every path.

pub mod fetch;
pub mod workspace;

use serde::Serialize;
use snafu::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::analyzer::{AnalysisOutput, Analyzer, CommandRunnerRef};
use crate::config::Config;
use crate::emit;
use crate::error::{
    AnalysisSnafu, CollectError, FetchSnafu, MalformedEventSnafu, ResumeStateSnafu, WorkspaceSnafu,
};
use crate::metrics::events::{InvocationCompleted, ObjectsDeleted, RunStatus};
use crate::source::{ObjectNotification, TriggerEvent};
use crate::storage::ObjectStorageRef;

pub use fetch::{ClaimedNames, ObjectFetcher};
pub use workspace::Workspace;

/// Status code reported for a completed invocation.
pub const STATUS_OK: u16 = 200;

/// Collector stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Provisioned,
    Fetching,
    Analyzing,
    Finalizing,
    Aborted,
}

impl Stage {
    /// Whether the collector may move from `self` to `next`.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Init, Provisioned)
                | (Provisioned, Fetching)
                | (Provisioned, Analyzing)
                | (Provisioned, Finalizing)
                | (Fetching, Analyzing)
                | (Fetching, Finalizing)
                | (Analyzing, Finalizing)
                | (Init | Provisioned | Fetching | Analyzing | Finalizing, Aborted)
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Provisioned => "provisioned",
            Stage::Fetching => "fetching",
            Stage::Analyzing => "analyzing",
            Stage::Finalizing => "finalizing",
            Stage::Aborted => "aborted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current stage and logs every transition.
#[derive(Debug)]
struct StageTracker {
    current: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: Stage::Init,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.current.can_advance_to(next),
            "invalid stage transition {} -> {}",
            self.current,
            next
        );
        debug!("[collect] {} -> {}", self.current, next);
        self.current = next;
    }
}

/// What a successful invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectSummary {
    /// Objects fetched and, after a successful run, deleted.
    pub objects: Vec<ObjectNotification>,
    /// Files the analyzer was run over.
    pub files_analyzed: usize,
    /// Whether the analyzer ran at all.
    pub analyzed: bool,
    /// Whether a resume state file existed and was removed.
    pub resume_state_cleared: bool,
}

/// Response of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub status_code: u16,
    pub body: String,
    #[serde(skip)]
    pub summary: CollectSummary,
}

impl Outcome {
    fn analyzed(output: &AnalysisOutput, summary: CollectSummary) -> Self {
        Self {
            status_code: STATUS_OK,
            body: format!("stdout={}, stderr={}", output.stdout, output.stderr),
            summary,
        }
    }

    fn nothing_to_analyze() -> Self {
        Self {
            status_code: STATUS_OK,
            body: "stdout=No objects to analyze, stderr=".to_string(),
            summary: CollectSummary::default(),
        }
    }
}

/// Working set assembled during `Fetching`.
#[derive(Debug, Default)]
struct Batch {
    objects: Vec<ObjectNotification>,
    files: Vec<PathBuf>,
}

/// Drives fetch, analysis and cleanup for one trigger event.
pub struct Collector {
    workspace: Workspace,
    input_file: Option<PathBuf>,
    storage: ObjectStorageRef,
    fetcher: ObjectFetcher,
    analyzer: Analyzer,
}

impl Collector {
    pub fn new(config: &Config, storage: ObjectStorageRef, runner: CommandRunnerRef) -> Self {
        Self {
            workspace: Workspace::new(&config.work_dir, &config.output_dir),
            input_file: config.input_file.clone(),
            fetcher: ObjectFetcher::new(storage.clone()),
            analyzer: Analyzer::from_config(config, runner),
            storage,
        }
    }

    /// Process one trigger event end to end.
    pub async fn run(&self, event: &TriggerEvent) -> Result<Outcome, CollectError> {
        let mut stages = StageTracker::new();
        let result = self.execute(event, &mut stages).await;

        match &result {
            Ok(outcome) => {
                let status = if outcome.summary.analyzed {
                    RunStatus::Success
                } else {
                    RunStatus::Skipped
                };
                emit!(InvocationCompleted { status });
                info!(
                    "Batch complete: {} object(s), {} file(s) analyzed",
                    outcome.summary.objects.len(),
                    outcome.summary.files_analyzed
                );
            }
            Err(e) => {
                stages.advance(Stage::Aborted);
                emit!(InvocationCompleted {
                    status: RunStatus::Failed
                });
                error!(
                    "Batch aborted: {}",
                    snafu::Report::from_error(e)
                );
            }
        }

        result
    }

    async fn execute(
        &self,
        event: &TriggerEvent,
        stages: &mut StageTracker,
    ) -> Result<Outcome, CollectError> {
        let analyzed = self.analyze_batch(event, stages).await;
        self.teardown().await;

        let Some((batch, output)) = analyzed? else {
            stages.advance(Stage::Finalizing);
            return Ok(Outcome::nothing_to_analyze());
        };

        stages.advance(Stage::Finalizing);
        self.finalize(batch, output).await
    }

    /// Provision, fetch and analyze. Returns `None` when there was nothing
    /// to analyze.
    async fn analyze_batch(
        &self,
        event: &TriggerEvent,
        stages: &mut StageTracker,
    ) -> Result<Option<(Batch, AnalysisOutput)>, CollectError> {
        self.workspace.provision().await.context(WorkspaceSnafu)?;
        stages.advance(Stage::Provisioned);

        let batch = match &self.input_file {
            Some(input) => {
                info!("Input file override set, analyzing {}", input.display());
                let file = self.workspace.import(input).await.context(WorkspaceSnafu)?;
                Batch {
                    objects: Vec::new(),
                    files: vec![file],
                }
            }
            None => {
                let notifications = event.notifications().context(MalformedEventSnafu)?;
                if notifications.is_empty() {
                    info!("Event carries no objects, skipping analysis");
                    return Ok(None);
                }
                stages.advance(Stage::Fetching);
                self.fetch_all(notifications).await?
            }
        };

        stages.advance(Stage::Analyzing);
        let output = self
            .analyzer
            .analyze(&self.workspace)
            .await
            .context(AnalysisSnafu)?;

        Ok(Some((batch, output)))
    }

    /// Fetch every notified object, stopping at the first failure.
    ///
    /// File names are checked for the whole batch before anything is
    /// downloaded, so a collision leaves the working set untouched.
    async fn fetch_all(&self, notifications: Vec<ObjectNotification>) -> Result<Batch, CollectError> {
        let mut objects = Vec::with_capacity(notifications.len());
        let mut seen = HashSet::new();
        let mut names = ClaimedNames::default();

        for notification in notifications {
            if !seen.insert((notification.bucket.clone(), notification.key.clone())) {
                debug!(
                    "Duplicate notification for s3://{}/{}, skipping",
                    notification.bucket, notification.key
                );
                continue;
            }
            names.claim(&notification.key).context(FetchSnafu)?;
            objects.push(notification);
        }

        let mut files = Vec::with_capacity(objects.len());
        for object in &objects {
            let file = self
                .fetcher
                .fetch(&object.bucket, &object.key, &self.workspace)
                .await
                .context(FetchSnafu)?;
            files.push(file);
        }

        info!("Fetched {} object(s)", objects.len());
        Ok(Batch { objects, files })
    }

    /// Remove processed source objects and the resume state.
    ///
    /// Every object is attempted even if an earlier delete failed; the first
    /// failure is returned.
    async fn finalize(
        &self,
        batch: Batch,
        output: AnalysisOutput,
    ) -> Result<Outcome, CollectError> {
        let mut first_error = None;
        let mut deleted = 0;

        for object in &batch.objects {
            match self.storage.delete(&object.bucket, &object.key).await {
                Ok(()) => {
                    deleted += 1;
                    debug!("Deleted s3://{}/{}", object.bucket, object.key);
                }
                Err(source) => {
                    warn!(
                        "Failed to delete s3://{}/{}: {}",
                        object.bucket, object.key, source
                    );
                    first_error.get_or_insert(CollectError::DeleteSource {
                        bucket: object.bucket.clone(),
                        key: object.key.clone(),
                        source,
                    });
                }
            }
        }
        emit!(ObjectsDeleted { count: deleted });

        if let Some(e) = first_error {
            return Err(e);
        }

        let resume_state_path = self.workspace.resume_state_path();
        let resume_state_cleared = self
            .workspace
            .clear_resume_state()
            .await
            .context(ResumeStateSnafu {
                path: &resume_state_path,
            })?;
        if resume_state_cleared {
            debug!("Removed resume state {}", resume_state_path.display());
        }

        let summary = CollectSummary {
            files_analyzed: batch.files.len(),
            objects: batch.objects,
            analyzed: true,
            resume_state_cleared,
        };
        Ok(Outcome::analyzed(&output, summary))
    }

    async fn teardown(&self) {
        if let Err(e) = self.workspace.destroy().await {
            warn!("Failed to remove work dir: {}", snafu::Report::from_error(e));
        }
    }
}

/// Build a collector from the config and run it against `event`.
pub async fn run_collector(
    config: &Config,
    storage: ObjectStorageRef,
    runner: CommandRunnerRef,
    event: &TriggerEvent,
) -> Result<Outcome, CollectError> {
    Collector::new(config, storage, runner).run(event).await
}
