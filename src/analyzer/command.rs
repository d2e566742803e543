//! Running external programs.
//!
//! The collector only needs run-to-completion semantics with captured
//! output, so a command is a plain value ([`CommandSpec`]) and running it
//! yields a [`CommandOutput`]. The [`CommandRunner`] trait is the seam that
//! lets tests stand in for the real analyzer.

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// A program invocation.
///
/// Arguments are OS strings so file names reach the program exactly as they
/// are on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// What a finished program left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a command to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` and wait for it. Only failure to start is an error; a
    /// non-zero exit is reported through [`CommandOutput::exit_code`].
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

/// A shared handle to a [`CommandRunner`].
pub type CommandRunnerRef = Arc<dyn CommandRunner>;

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommandRunner;

#[async_trait]
impl CommandRunner for LocalCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            working_dir: None,
        }
    }

    #[test]
    fn test_display_joins_args() {
        let spec = CommandSpec {
            program: "/opt/badger/pgbadger".into(),
            args: vec!["-v".into(), "-f".into(), "rds".into()],
            working_dir: None,
        };
        assert_eq!(spec.to_string(), "/opt/badger/pgbadger -v -f rds");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let output = LocalCommandRunner
            .run(&sh("echo report; echo warning >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout, "report\n");
        assert_eq!(output.stderr, "warning\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut spec = sh("pwd");
        spec.working_dir = Some(dir.path().to_path_buf());

        let output = LocalCommandRunner.run(&spec).await.unwrap();
        assert!(output.success());
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let spec = CommandSpec {
            program: "/nonexistent/badger-analyzer".into(),
            args: Vec::new(),
            working_dir: None,
        };
        assert!(LocalCommandRunner.run(&spec).await.is_err());
    }
}
