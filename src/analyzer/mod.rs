//! Invocation of the external log analyzer (pgbadger).
//!
//! The analyzer runs once per batch over the whole working set, in
//! incremental mode: it appends to the HTML/binary reports in the output dir
//! and records how far it got in the resume state file. Clearing that file is
//! the collector's job, never this module's.

pub mod command;

use snafu::prelude::*;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{AnalysisError, ListLogsSnafu, SpawnSnafu, ToolFailedSnafu};
use crate::metrics::events::{AnalysisCompleted, RunStatus};
use crate::pipeline::workspace::Workspace;

pub use command::{CommandOutput, CommandRunner, CommandRunnerRef, CommandSpec, LocalCommandRunner};

/// Captured output of a successful analyzer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Builds and runs the analyzer command line.
#[derive(Clone)]
pub struct Analyzer {
    program: PathBuf,
    log_format: String,
    output_file: Option<String>,
    runner: CommandRunnerRef,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("program", &self.program)
            .field("log_format", &self.log_format)
            .field("output_file", &self.output_file)
            .finish()
    }
}

fn arg(path: &Path) -> OsString {
    path.as_os_str().to_owned()
}

impl Analyzer {
    pub fn new(program: impl Into<PathBuf>, runner: CommandRunnerRef) -> Self {
        Self {
            program: program.into(),
            log_format: "rds".to_string(),
            output_file: None,
            runner,
        }
    }

    /// Analyzer settings taken from the collector config.
    pub fn from_config(config: &Config, runner: CommandRunnerRef) -> Self {
        Self {
            program: config.analyzer.program.clone(),
            log_format: config.analyzer.log_format.clone(),
            output_file: config.output_file.clone(),
            runner,
        }
    }

    /// The command line for one run over `inputs`.
    ///
    /// With no inputs the unexpanded `logs/*` pattern is passed, the way a
    /// shell hands over a glob that matched nothing.
    pub fn command(&self, workspace: &Workspace, inputs: &[PathBuf]) -> CommandSpec {
        let mut args: Vec<OsString> = vec![
            "-v".into(),
            "-f".into(),
            self.log_format.clone().into(),
            "--no-process-info".into(),
            "--pid-dir".into(),
            arg(&workspace.pid_dir()),
            "--anonymize".into(),
            "--last-parsed".into(),
            arg(&workspace.resume_state_path()),
            "-X".into(),
            "-I".into(),
            "-H".into(),
            arg(&workspace.html_dir()),
            "-O".into(),
            arg(&workspace.binary_dir()),
        ];

        if let Some(output_file) = &self.output_file {
            args.push("-o".into());
            args.push(output_file.into());
        }

        if inputs.is_empty() {
            args.push(arg(&workspace.logs_dir().join("*")));
        } else {
            args.extend(inputs.iter().map(|input| arg(input)));
        }

        CommandSpec {
            program: self.program.clone(),
            args,
            working_dir: Some(workspace.work_dir().to_path_buf()),
        }
    }

    /// Run the analyzer over every file in the working set.
    pub async fn analyze(&self, workspace: &Workspace) -> Result<AnalysisOutput, AnalysisError> {
        let inputs = workspace.log_files().await.context(ListLogsSnafu {
            path: workspace.logs_dir(),
        })?;
        let spec = self.command(workspace, &inputs);
        info!("Running analyzer over {} file(s)", inputs.len());
        debug!("{}", spec);

        let start = Instant::now();
        let output = match self.runner.run(&spec).await {
            Ok(output) => output,
            Err(source) => {
                emit!(AnalysisCompleted {
                    status: RunStatus::Failed,
                    duration: start.elapsed(),
                });
                return Err(source).context(SpawnSnafu {
                    program: spec.program,
                });
            }
        };

        let status = if output.success() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        emit!(AnalysisCompleted {
            status,
            duration: start.elapsed(),
        });

        debug!("Analyzer stdout: {}", output.stdout);
        if !output.stderr.is_empty() {
            debug!("Analyzer stderr: {}", output.stderr);
        }

        if !output.success() {
            warn!("Analyzer exited with {:?}", output.exit_code);
            return ToolFailedSnafu {
                code: output.exit_code,
                stderr: output.stderr,
            }
            .fail();
        }

        Ok(AnalysisOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records every spec and answers with a canned output.
    struct ScriptedRunner {
        output: CommandOutput,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        fn new(exit_code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                output: CommandOutput {
                    exit_code: Some(exit_code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok(self.output.clone())
        }
    }

    struct UnstartableRunner;

    #[async_trait]
    impl CommandRunner for UnstartableRunner {
        async fn run(&self, _spec: &CommandSpec) -> io::Result<CommandOutput> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn workspace() -> Workspace {
        Workspace::new("/tmp/pgbadger-work", "/mnt/efs/badger")
    }

    #[test]
    fn test_command_line_contract() {
        let analyzer = Analyzer::new("/opt/badger/pgbadger", ScriptedRunner::new(0, "", ""));
        let inputs = vec![
            PathBuf::from("/tmp/pgbadger-work/logs/a.gz"),
            PathBuf::from("/tmp/pgbadger-work/logs/b.gz"),
        ];

        let spec = analyzer.command(&workspace(), &inputs);

        assert_eq!(spec.program, PathBuf::from("/opt/badger/pgbadger"));
        assert_eq!(
            spec.to_string(),
            "/opt/badger/pgbadger -v -f rds --no-process-info \
             --pid-dir /tmp/pgbadger-work/tmp --anonymize \
             --last-parsed /mnt/efs/badger/last-parsed-custom \
             -X -I -H /mnt/efs/badger/html -O /mnt/efs/badger/binary \
             /tmp/pgbadger-work/logs/a.gz /tmp/pgbadger-work/logs/b.gz"
        );
        assert_eq!(
            spec.working_dir,
            Some(PathBuf::from("/tmp/pgbadger-work"))
        );
    }

    #[test]
    fn test_empty_working_set_passes_pattern() {
        let analyzer = Analyzer::new("/opt/badger/pgbadger", ScriptedRunner::new(0, "", ""));
        let spec = analyzer.command(&workspace(), &[]);

        assert_eq!(
            spec.args.last().map(OsString::as_os_str),
            Some(std::ffi::OsStr::new("/tmp/pgbadger-work/logs/*"))
        );
    }

    #[test]
    fn test_output_file_adds_flag() {
        let mut config = Config::new("/mnt/efs/badger");
        config.output_file = Some("report.html".to_string());
        let analyzer = Analyzer::from_config(&config, ScriptedRunner::new(0, "", ""));

        let spec = analyzer.command(&workspace(), &[]);
        let position = spec.args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(spec.args[position + 1], "report.html");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_file_names_pass_through() {
        use std::os::unix::ffi::OsStrExt;

        let analyzer = Analyzer::new("/opt/badger/pgbadger", ScriptedRunner::new(0, "", ""));
        let name = std::ffi::OsStr::from_bytes(b"/tmp/pgbadger-work/logs/caf\xe9.log");
        let spec = analyzer.command(&workspace(), &[PathBuf::from(name)]);

        assert_eq!(spec.args.last().map(OsString::as_os_str), Some(name));
    }

    #[tokio::test]
    async fn test_analyze_runs_once_over_working_set() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::new(root.path().join("work"), root.path().join("out"));
        ws.provision().await.unwrap();
        std::fs::write(ws.logs_dir().join("b.log"), b"b").unwrap();
        std::fs::write(ws.logs_dir().join("a.log"), b"a").unwrap();

        let runner = ScriptedRunner::new(0, "parsed 2 files", "");
        let analyzer = Analyzer::new("pgbadger", runner.clone());

        let output = analyzer.analyze(&ws).await.unwrap();
        assert_eq!(output.stdout, "parsed 2 files");

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let tail: Vec<_> = calls[0].args.iter().rev().take(2).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                arg(&ws.logs_dir().join("a.log")),
                arg(&ws.logs_dir().join("b.log"))
            ]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_tool_failure() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::new(root.path().join("work"), root.path().join("out"));
        ws.provision().await.unwrap();

        let analyzer = Analyzer::new("pgbadger", ScriptedRunner::new(2, "", "FATAL: bad format"));
        let err = analyzer.analyze(&ws).await.unwrap_err();

        match err {
            AnalysisError::ToolFailed { code, stderr } => {
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "FATAL: bad format");
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::new(root.path().join("work"), root.path().join("out"));
        ws.provision().await.unwrap();

        let analyzer = Analyzer::new("pgbadger", Arc::new(UnstartableRunner));
        let err = analyzer.analyze(&ws).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_missing_logs_dir_is_list_error() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::new(root.path().join("never-created"), root.path().join("out"));

        let analyzer = Analyzer::new("pgbadger", ScriptedRunner::new(0, "", ""));
        let err = analyzer.analyze(&ws).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ListLogs { .. }));
    }
}
