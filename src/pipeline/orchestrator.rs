//! Pipeline Orchestrator
//!
//! Runs the ordered stage pipeline for one generation request, emitting
//! progress events on an mpsc channel as each stage begins and terminating
//! the stream with exactly one `completed` or `error` event.
//!
//! The working directory is a [`tempfile::TempDir`] removed exactly once on
//! every exit path. The consumer dropping its receiver is observed between
//! stages and cancels the run before the next stage launches; a stage
//! already in flight runs to completion or its bounded timeout first.
//! `kill_on_drop` covers the timeout path, where the wait future is dropped
//! while the subprocess is live.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::ledger::bundle::{BundleCodec, BundleFiles};
use crate::ledger::ChannelId;

use super::prover::Prover;
use super::signatures::{stdout_confirms_verified, FailureClassifier};
use super::stage::{Stage, TRANSACTION_FILE};
use super::{PipelineError, ProgressEvent, ProgressStep};

/// One run of the generation pipeline. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    /// Channel the generated bundle belongs to.
    pub channel: ChannelId,
    /// Run the full proving branch, not just synthesis.
    pub include_proof: bool,
    /// Transaction payload handed to the synthesize stage.
    pub transaction: serde_json::Value,
}

/// Drives pipeline jobs against the external prover.
pub struct Orchestrator {
    prover: Arc<dyn Prover>,
    codec: Arc<dyn BundleCodec>,
    classifier: FailureClassifier,
    workdir_root: Option<PathBuf>,
}

impl Orchestrator {
    /// Create an orchestrator over the given prover and artifact codec.
    pub fn new(prover: Arc<dyn Prover>, codec: Arc<dyn BundleCodec>) -> Self {
        Self {
            prover,
            codec,
            classifier: FailureClassifier::default(),
            workdir_root: None,
        }
    }

    /// Replace the failure-signature table.
    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Create job working directories under `root` instead of the system
    /// temp directory.
    pub fn with_workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workdir_root = Some(root.into());
        self
    }

    /// Run one job to its terminal outcome, streaming progress on `events`.
    ///
    /// Never panics and never leaves the working directory behind. Exactly
    /// one terminal event is emitted unless the consumer is already gone.
    pub async fn run(&self, job: PipelineJob, events: mpsc::Sender<ProgressEvent>) {
        let workdir = match self.make_workdir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("channel '{}': could not create workdir: {}", job.channel, e);
                let _ = events.send(ProgressEvent::error(e.to_string())).await;
                return;
            }
        };

        info!(
            "channel '{}': pipeline starting (include_proof={}) in {}",
            job.channel,
            job.include_proof,
            workdir.path().display()
        );

        let result = self.run_stages(&job, workdir.path(), &events).await;

        // Cleanup runs on every exit path, exactly once.
        if let Err(e) = workdir.close() {
            warn!("channel '{}': workdir cleanup failed: {}", job.channel, e);
        }

        match result {
            Ok(artifact_b64) => {
                info!("channel '{}': pipeline completed", job.channel);
                let _ = events.send(ProgressEvent::completed(artifact_b64)).await;
            }
            Err(PipelineError::Cancelled) => {
                debug!("channel '{}': pipeline cancelled by consumer", job.channel);
            }
            Err(e) => {
                error!("channel '{}': pipeline failed: {}", job.channel, e);
                let _ = events.send(ProgressEvent::failure(&e)).await;
            }
        }
    }

    async fn run_stages(
        &self,
        job: &PipelineJob,
        dir: &Path,
        events: &mpsc::Sender<ProgressEvent>,
    ) -> Result<String, PipelineError> {
        let mut completed: Vec<&'static str> = Vec::new();

        self.emit(
            events,
            ProgressEvent::status(ProgressStep::Synthesizing, "preparing pipeline inputs"),
        )
        .await?;
        let payload = serde_json::to_vec_pretty(&job.transaction)
            .map_err(|e| PipelineError::Packaging(e.to_string()))?;
        tokio::fs::write(dir.join(TRANSACTION_FILE), payload).await?;

        self.run_stage(Stage::Synthesize, dir, events, &mut completed)
            .await?;

        if job.include_proof {
            self.run_stage(Stage::Prove, dir, events, &mut completed)
                .await?;
            self.run_stage(Stage::Preprocess, dir, events, &mut completed)
                .await?;
            self.run_stage(Stage::Verify, dir, events, &mut completed)
                .await?;
            self.run_stage(Stage::Extract, dir, events, &mut completed)
                .await?;
        } else {
            self.emit(
                events,
                ProgressEvent::status(ProgressStep::Synthesizing, "packaging synthesis output"),
            )
            .await?;
        }

        debug!(
            "channel '{}': stages done: [{}]",
            job.channel,
            completed.join(", ")
        );
        self.package(dir).await
    }

    /// Run one stage: emit its start event, invoke the prover, classify the
    /// outcome.
    async fn run_stage(
        &self,
        stage: Stage,
        dir: &Path,
        events: &mpsc::Sender<ProgressEvent>,
        completed: &mut Vec<&'static str>,
    ) -> Result<(), PipelineError> {
        if events.is_closed() {
            return Err(PipelineError::Cancelled);
        }
        self.emit(
            events,
            ProgressEvent::status(stage.wire_step(), stage.start_message()),
        )
        .await?;

        let output = self.prover.run_stage(stage, dir).await?;

        // Known signatures on the error stream fail the stage even when the
        // exit code said success.
        if let Some(detail) = self.classifier.classify(&output.stderr) {
            return Err(PipelineError::Stage {
                stage: stage.name(),
                detail,
            });
        }

        if !output.status_ok {
            let detail = output
                .stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| "exited with failure status".to_string());
            return Err(PipelineError::Stage {
                stage: stage.name(),
                detail,
            });
        }

        // Success on the verify stage is additionally gated on an explicit
        // confirmation phrase.
        if stage == Stage::Verify && !stdout_confirms_verified(&output.stdout) {
            return Err(PipelineError::Stage {
                stage: stage.name(),
                detail: "prover output did not confirm verification".to_string(),
            });
        }

        completed.push(stage.name());
        Ok(())
    }

    /// Pack every stage output in the working directory into the artifact
    /// blob, base64-encoded for the terminal event.
    async fn package(&self, dir: &Path) -> Result<String, PipelineError> {
        let mut files = BundleFiles::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // The transaction payload is the pipeline's input, not a result.
            if name == TRANSACTION_FILE {
                continue;
            }
            files.insert(name, tokio::fs::read(entry.path()).await?);
        }

        let blob = self
            .codec
            .pack(&files)
            .map_err(|e| PipelineError::Packaging(e.to_string()))?;
        Ok(BASE64.encode(blob))
    }

    async fn emit(
        &self,
        events: &mpsc::Sender<ProgressEvent>,
        event: ProgressEvent,
    ) -> Result<(), PipelineError> {
        events
            .send(event)
            .await
            .map_err(|_| PipelineError::Cancelled)
    }

    fn make_workdir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("proofgen-");
        match &self.workdir_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}
