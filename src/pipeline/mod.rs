//! Proof Generation Pipeline
//!
//! Drives the multi-stage generation pipeline (synthesize → prove →
//! preprocess → verify → extract) against the external cryptographic prover,
//! reporting progress as a live event stream and classifying subprocess
//! failures into actionable categories.
//!
//! The prover is a black-box subprocess with a fixed command-line contract
//! per stage; its only error channel is text, so failures are recognized by
//! signature matching on the combined error stream (see [`signatures`]).

pub mod orchestrator;
pub mod prover;
pub mod signatures;
pub mod stage;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

pub use orchestrator::{Orchestrator, PipelineJob};
pub use prover::{Prover, ProverCommand, StageOutput};
pub use signatures::FailureClassifier;
pub use stage::Stage;

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage's subprocess failed, or its output matched a known failure
    /// signature.
    #[error("{stage} stage failed: {detail}")]
    Stage {
        /// Name of the failed stage.
        stage: &'static str,
        /// Extracted failure detail.
        detail: String,
    },

    /// A stage exceeded its bounded timeout.
    #[error("{stage} stage timed out after {after:?}")]
    Timeout {
        /// Name of the timed-out stage.
        stage: &'static str,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// The prover subprocess could not be launched or its workdir written.
    #[error("prover I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The consumer disconnected; the run was abandoned between stages.
    #[error("pipeline cancelled: consumer disconnected")]
    Cancelled,

    /// Packaging the output artifact failed.
    #[error("artifact packaging failed: {0}")]
    Packaging(String),

    /// The path store failed underneath.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Name of the stage this error belongs to, when it has one.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PipelineError::Stage { stage, .. } => Some(stage),
            PipelineError::Timeout { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Wire-level step of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    /// Input preparation, circuit synthesis, or output packaging.
    Synthesizing,
    /// Proof construction and preprocessing.
    Proving,
    /// Proof verification and calldata extraction.
    Verifying,
    /// Terminal: the artifact is ready.
    Completed,
    /// Terminal: the run failed.
    Error,
}

/// One unit of the orchestrator's live status stream.
///
/// The stream is append-only and order-preserving; it terminates with
/// exactly one `completed` or `error` event, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Wire-level step.
    pub step: ProgressStep,
    /// Human-readable status line.
    pub message: String,
    /// Failure detail, present only on `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Base64 artifact, present only on `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_bytes: Option<String>,
}

impl ProgressEvent {
    /// A non-terminal status event.
    pub fn status(step: ProgressStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            error: None,
            artifact_bytes: None,
        }
    }

    /// The terminal success event carrying the packed artifact.
    pub fn completed(artifact_b64: String) -> Self {
        Self {
            step: ProgressStep::Completed,
            message: "proof bundle ready".to_string(),
            error: None,
            artifact_bytes: Some(artifact_b64),
        }
    }

    /// The terminal failure event.
    pub fn error(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            step: ProgressStep::Error,
            message: "pipeline failed".to_string(),
            error: Some(detail),
            artifact_bytes: None,
        }
    }

    /// The terminal failure event for a classified pipeline error.
    ///
    /// Stage failures surface the extracted message fragment as the error
    /// detail; the stage name rides on the message.
    pub fn failure(err: &PipelineError) -> Self {
        let (message, detail) = match err {
            PipelineError::Stage { stage, detail } => {
                (format!("{} stage failed", stage), detail.clone())
            }
            PipelineError::Timeout { stage, after } => (
                format!("{} stage timed out", stage),
                format!("no output within {:?}", after),
            ),
            other => ("pipeline failed".to_string(), other.to_string()),
        };
        Self {
            step: ProgressStep::Error,
            message,
            error: Some(detail),
            artifact_bytes: None,
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self.step, ProgressStep::Completed | ProgressStep::Error)
    }
}
