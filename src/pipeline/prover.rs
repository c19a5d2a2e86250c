//! External Prover Adapter
//!
//! The prover is a command-line tool invoked once per pipeline stage with a
//! fixed argument vector, under a bounded timeout. The adapter is a trait so
//! the orchestrator can be exercised against a scripted prover in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::debug;

use super::stage::Stage;
use super::PipelineError;

/// Captured result of one stage subprocess.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Whether the process exit code indicated success.
    pub status_ok: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured error stream.
    pub stderr: String,
}

/// One subprocess invocation per pipeline stage.
pub trait Prover: Send + Sync {
    /// Run `stage` inside `workdir` and capture its output.
    ///
    /// A timeout surfaces as [`PipelineError::Timeout`]; a non-zero exit is
    /// NOT an error here — the orchestrator owns failure classification.
    fn run_stage<'a>(
        &'a self,
        stage: Stage,
        workdir: &'a Path,
    ) -> BoxFuture<'a, Result<StageOutput, PipelineError>>;
}

/// The real prover: a configured binary run via `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProverCommand {
    binary: PathBuf,
}

impl ProverCommand {
    /// Adapter for the prover binary at `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Prover for ProverCommand {
    fn run_stage<'a>(
        &'a self,
        stage: Stage,
        workdir: &'a Path,
    ) -> BoxFuture<'a, Result<StageOutput, PipelineError>> {
        Box::pin(async move {
            let deadline = stage.timeout();
            debug!(
                "spawning prover stage '{}' in {} (budget {:?})",
                stage.name(),
                workdir.display(),
                deadline
            );

            let child = Command::new(&self.binary)
                .args(stage.args())
                .current_dir(workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                // Dropping the wait future (timeout, task abort) must not
                // orphan a multi-minute prover process.
                .kill_on_drop(true)
                .spawn()?;

            let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(PipelineError::Timeout {
                        stage: stage.name(),
                        after: deadline,
                    })
                }
            };

            Ok(StageOutput {
                status_ok: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let prover = ProverCommand::new("/nonexistent/prover-binary");
        let dir = tempfile::tempdir().unwrap();

        let err = prover
            .run_stage(Stage::Synthesize, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_streams_and_exit_status() {
        // A shell stand-in for the prover: echoes on both streams, exits 0.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("prover.sh");
        tokio::fs::write(
            &script,
            "#!/bin/sh\necho synthesized\necho 'noise' >&2\nexit 0\n",
        )
        .await
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let prover = ProverCommand::new(&script);
        let output = prover
            .run_stage(Stage::Synthesize, dir.path())
            .await
            .unwrap();

        assert!(output.status_ok);
        assert!(output.stdout.contains("synthesized"));
        assert!(output.stderr.contains("noise"));
    }
}
