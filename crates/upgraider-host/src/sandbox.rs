//! Snippet execution through an external sandbox script.
//!
//! The script owns environment setup (virtualenv, pinned library version,
//! requirements). It is invoked as
//!
//! ```text
//! <script> <snippet.py> <library name> <library version> [requirements.txt]
//! ```
//!
//! and its stderr is what gets classified.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, warn};
use upgraider_core::{Library, RunOutcome, classify_run};

/// Captured output of one snippet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl Execution {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, snippet: &Path, library: &Library) -> anyhow::Result<Execution>;
}

/// Runs snippets with a shell script under a wall-clock limit.
pub struct ScriptSandbox {
    script: PathBuf,
    timeout: Duration,
}

impl ScriptSandbox {
    pub fn new(script: PathBuf, timeout: Duration) -> Self {
        Self { script, timeout }
    }
}

#[async_trait]
impl Sandbox for ScriptSandbox {
    async fn execute(&self, snippet: &Path, library: &Library) -> anyhow::Result<Execution> {
        let mut cmd = tokio::process::Command::new(&self.script);
        cmd.arg(snippet)
            .arg(&library.name)
            .arg(&library.currentversion)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(requirements) = library.requirements_file() {
            cmd.arg(requirements);
        }

        debug!(script = %self.script.display(), snippet = %snippet.display(), "running snippet");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .with_context(|| format!("snippet run exceeded {:?}", self.timeout))?
            .with_context(|| format!("failed to run sandbox script {}", self.script.display()))?;

        Ok(Execution {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

/// Execute and classify. A sandbox failure becomes an unclassified error
/// instead of aborting the snippet.
pub async fn run_snippet(sandbox: &dyn Sandbox, snippet: &Path, library: &Library) -> RunOutcome {
    match sandbox.execute(snippet, library).await {
        Ok(execution) => classify_run(&execution.stderr, execution.succeeded()),
        Err(e) => {
            warn!(snippet = %snippet.display(), error = %e, "sandbox execution failed");
            RunOutcome::execution_failed(&format!("{e:#}"))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use upgraider_core::ProblemKind;

    fn library(path: &Path) -> Library {
        Library {
            name: "numpy".into(),
            ghurl: "https://github.com/numpy/numpy".into(),
            baseversion: "1.23.0".into(),
            currentversion: "1.25.0".into(),
            path: path.to_string_lossy().into_owned(),
        }
    }

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("run_code.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn passes_snippet_library_and_version() {
        let tmp = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(
            script(tmp.path(), r#"echo "$1|$2|$3|$4""#),
            Duration::from_secs(10),
        );
        let exec = sandbox
            .execute(Path::new("/tmp/msort.py"), &library(tmp.path()))
            .await
            .unwrap();
        assert!(exec.succeeded());
        assert_eq!(exec.stdout.trim(), "/tmp/msort.py|numpy|1.25.0|");
    }

    #[tokio::test]
    async fn forwards_requirements_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "scipy\n").unwrap();
        let sandbox = ScriptSandbox::new(script(tmp.path(), r#"echo "$4""#), Duration::from_secs(10));
        let exec = sandbox
            .execute(Path::new("x.py"), &library(tmp.path()))
            .await
            .unwrap();
        assert!(exec.stdout.trim().ends_with("requirements.txt"));
    }

    #[tokio::test]
    async fn failing_run_is_classified() {
        let tmp = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(
            script(
                tmp.path(),
                r#"echo "AttributeError: module 'numpy' has no attribute 'msort'" >&2; exit 1"#,
            ),
            Duration::from_secs(10),
        );
        let outcome = run_snippet(&sandbox, Path::new("x.py"), &library(tmp.path())).await;
        assert!(!outcome.problem_free);
        assert_eq!(outcome.kind(), ProblemKind::AttributeError);
    }

    #[tokio::test]
    async fn missing_script_is_unclassified() {
        let tmp = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(tmp.path().join("nope.sh"), Duration::from_secs(10));
        let outcome = run_snippet(&sandbox, Path::new("x.py"), &library(tmp.path())).await;
        assert!(!outcome.problem_free);
        assert_eq!(outcome.kind(), ProblemKind::UnclassifiedError);
    }

    #[tokio::test]
    async fn slow_run_times_out() {
        let tmp = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(script(tmp.path(), "sleep 5"), Duration::from_millis(100));
        let result = sandbox.execute(Path::new("x.py"), &library(tmp.path())).await;
        assert!(result.is_err());
    }
}
