//! Directory layout for one collector invocation.
//!
//! ```text
//! {work_dir}/tmp          analyzer pid directory
//! {work_dir}/logs         plaintext working set
//! {output_dir}/html       incremental HTML report
//! {output_dir}/binary     incremental binary data
//! {output_dir}/report     reserved
//! {output_dir}/log        reserved
//! {output_dir}/last-parsed-custom   analyzer resume state
//! ```
//!
//! The work dir belongs to one invocation and is recreated every time. The
//! output dir outlives invocations and is only ever created.

use snafu::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CopyInputSnafu, CreateDirSnafu, RemoveDirSnafu, WorkspaceError};

/// Name of the analyzer's resume state file inside the output dir.
pub const RESUME_STATE_FILE: &str = "last-parsed-custom";

const WORK_SUBDIRS: [&str; 2] = ["tmp", "logs"];
const OUTPUT_SUBDIRS: [&str; 4] = ["html", "binary", "report", "log"];

/// Paths used by one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    pub fn new(work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Directory holding the plaintext working set.
    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }

    /// Directory handed to the analyzer for its pid file.
    pub fn pid_dir(&self) -> PathBuf {
        self.work_dir.join("tmp")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.output_dir.join("html")
    }

    pub fn binary_dir(&self) -> PathBuf {
        self.output_dir.join("binary")
    }

    pub fn resume_state_path(&self) -> PathBuf {
        self.output_dir.join(RESUME_STATE_FILE)
    }

    /// Recreate the work dir from scratch and make sure the output layout exists.
    ///
    /// Whatever a previous, possibly crashed, invocation left in the work dir
    /// is discarded.
    pub async fn provision(&self) -> Result<(), WorkspaceError> {
        self.destroy().await?;

        for name in WORK_SUBDIRS {
            let path = self.work_dir.join(name);
            tokio::fs::create_dir_all(&path)
                .await
                .context(CreateDirSnafu { path: &path })?;
        }

        for name in OUTPUT_SUBDIRS {
            let path = self.output_dir.join(name);
            tokio::fs::create_dir_all(&path)
                .await
                .context(CreateDirSnafu { path: &path })?;
        }

        debug!(
            "Provisioned work dir {} (output {})",
            self.work_dir.display(),
            self.output_dir.display()
        );
        Ok(())
    }

    /// Remove the work dir and everything in it. A missing dir is not an error.
    pub async fn destroy(&self) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_dir_all(&self.work_dir).await {
            Ok(()) => {
                debug!("Removed work dir {}", self.work_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(RemoveDirSnafu {
                path: self.work_dir.clone(),
            }),
        }
    }

    /// Copy a local file into the working set, keeping its file name.
    pub async fn import(&self, input: &Path) -> Result<PathBuf, WorkspaceError> {
        let name = input.file_name().unwrap_or(input.as_os_str());
        let destination = self.logs_dir().join(name);

        tokio::fs::copy(input, &destination)
            .await
            .context(CopyInputSnafu { path: input })?;
        Ok(destination)
    }

    /// Regular files in the working set, sorted by name.
    pub async fn log_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(self.logs_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Delete the resume state file. Returns whether a file was removed.
    pub async fn clear_resume_state(&self) -> io::Result<bool> {
        match tokio::fs::remove_file(self.resume_state_path()).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace(root: &TempDir) -> Workspace {
        Workspace::new(root.path().join("work"), root.path().join("out"))
    }

    #[tokio::test]
    async fn test_provision_creates_layout() {
        let root = TempDir::new().unwrap();
        let ws = workspace(&root);

        ws.provision().await.unwrap();

        for dir in ["work/tmp", "work/logs", "out/html", "out/binary", "out/report", "out/log"] {
            assert!(root.path().join(dir).is_dir(), "{dir} missing");
        }
    }

    #[tokio::test]
    async fn test_provision_discards_stale_work_but_keeps_output() {
        let root = TempDir::new().unwrap();
        let ws = workspace(&root);
        ws.provision().await.unwrap();

        std::fs::write(ws.logs_dir().join("stale.log"), b"old").unwrap();
        std::fs::write(ws.html_dir().join("index.html"), b"report").unwrap();
        std::fs::write(ws.resume_state_path(), b"state").unwrap();

        ws.provision().await.unwrap();

        assert!(ws.log_files().await.unwrap().is_empty());
        assert!(ws.html_dir().join("index.html").exists());
        assert!(ws.resume_state_path().exists());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let root = TempDir::new().unwrap();
        let ws = workspace(&root);
        ws.provision().await.unwrap();

        ws.destroy().await.unwrap();
        assert!(!ws.work_dir().exists());
        ws.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_log_files_sorted_and_files_only() {
        let root = TempDir::new().unwrap();
        let ws = workspace(&root);
        ws.provision().await.unwrap();

        std::fs::write(ws.logs_dir().join("b.log"), b"").unwrap();
        std::fs::write(ws.logs_dir().join("a.log"), b"").unwrap();
        std::fs::create_dir(ws.logs_dir().join("nested")).unwrap();

        let files = ws.log_files().await.unwrap();
        assert_eq!(
            files,
            vec![ws.logs_dir().join("a.log"), ws.logs_dir().join("b.log")]
        );
    }

    #[tokio::test]
    async fn test_import_and_clear_resume_state() {
        let root = TempDir::new().unwrap();
        let ws = workspace(&root);
        ws.provision().await.unwrap();

        let input = root.path().join("postgresql.log");
        std::fs::write(&input, b"line\n").unwrap();
        let imported = ws.import(&input).await.unwrap();
        assert_eq!(imported, ws.logs_dir().join("postgresql.log"));
        assert_eq!(std::fs::read(&imported).unwrap(), b"line\n");

        assert!(!ws.clear_resume_state().await.unwrap());
        std::fs::write(ws.resume_state_path(), b"state").unwrap();
        assert!(ws.clear_resume_state().await.unwrap());
        assert!(!ws.resume_state_path().exists());
    }
}
