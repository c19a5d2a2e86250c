//! Pipeline Stages
//!
//! One subprocess invocation of the external prover performs one named
//! stage. Each stage carries a fixed argument vector (relative to the job's
//! working directory) and a bounded timeout.

use std::time::Duration;

use super::ProgressStep;

/// Transaction payload written into the working directory before synthesis.
pub const TRANSACTION_FILE: &str = "transaction.json";

/// Synthesis output consumed by the prove stage (or packaged directly).
pub const SYNTHESIS_FILE: &str = "synthesis.json";

/// Proof produced by the prove stage.
pub const PROOF_FILE: &str = "proof.json";

/// Public instance produced by the preprocess stage.
pub const INSTANCE_FILE: &str = "instance.json";

/// Contract calldata produced by the extract stage.
pub const CALLDATA_FILE: &str = "calldata.json";

/// The five prover invocations, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Synthesize the circuit trace from the transaction payload.
    Synthesize,
    /// Construct the proof from the synthesis output.
    Prove,
    /// Preprocess the proof into verifier inputs.
    Preprocess,
    /// Verify the proof against the instance.
    Verify,
    /// Extract contract calldata from the verified proof.
    Extract,
}

impl Stage {
    /// Stage name used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Synthesize => "synthesize",
            Stage::Prove => "prove",
            Stage::Preprocess => "preprocess",
            Stage::Verify => "verify",
            Stage::Extract => "extract",
        }
    }

    /// Bounded wall-clock budget for the subprocess.
    pub fn timeout(self) -> Duration {
        match self {
            // Proof construction dominates; everything else is bounded tighter.
            Stage::Prove => Duration::from_secs(600),
            _ => Duration::from_secs(300),
        }
    }

    /// Fixed argument vector, relative to the working directory.
    pub fn args(self) -> Vec<&'static str> {
        match self {
            Stage::Synthesize => vec![
                "synthesize",
                "--input",
                TRANSACTION_FILE,
                "--output",
                SYNTHESIS_FILE,
            ],
            Stage::Prove => vec!["prove", "--input", SYNTHESIS_FILE, "--output", PROOF_FILE],
            Stage::Preprocess => vec![
                "preprocess",
                "--proof",
                PROOF_FILE,
                "--output",
                INSTANCE_FILE,
            ],
            Stage::Verify => vec!["verify", "--proof", PROOF_FILE, "--instance", INSTANCE_FILE],
            Stage::Extract => vec![
                "extract",
                "--proof",
                PROOF_FILE,
                "--instance",
                INSTANCE_FILE,
                "--output",
                CALLDATA_FILE,
            ],
        }
    }

    /// Wire-level step this stage reports under.
    ///
    /// The wire enum is fixed at synthesizing/proving/verifying; preprocess
    /// reports under `proving` and extract under `verifying`, with the
    /// status message carrying the precise stage.
    pub fn wire_step(self) -> ProgressStep {
        match self {
            Stage::Synthesize => ProgressStep::Synthesizing,
            Stage::Prove | Stage::Preprocess => ProgressStep::Proving,
            Stage::Verify | Stage::Extract => ProgressStep::Verifying,
        }
    }

    /// Status line emitted when the stage begins.
    pub fn start_message(self) -> &'static str {
        match self {
            Stage::Synthesize => "running circuit synthesis",
            Stage::Prove => "constructing proof",
            Stage::Preprocess => "preprocessing proof into verifier inputs",
            Stage::Verify => "verifying proof",
            Stage::Extract => "extracting contract calldata",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prove_gets_the_long_budget() {
        assert_eq!(Stage::Prove.timeout(), Duration::from_secs(600));
        assert_eq!(Stage::Synthesize.timeout(), Duration::from_secs(300));
        assert_eq!(Stage::Verify.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_argv_is_fixed_per_stage() {
        assert_eq!(Stage::Synthesize.args()[0], "synthesize");
        assert!(Stage::Verify.args().contains(&INSTANCE_FILE));
        assert!(Stage::Extract.args().contains(&CALLDATA_FILE));
    }

    #[test]
    fn test_wire_step_mapping() {
        assert_eq!(Stage::Synthesize.wire_step(), ProgressStep::Synthesizing);
        assert_eq!(Stage::Prove.wire_step(), ProgressStep::Proving);
        assert_eq!(Stage::Preprocess.wire_step(), ProgressStep::Proving);
        assert_eq!(Stage::Verify.wire_step(), ProgressStep::Verifying);
        assert_eq!(Stage::Extract.wire_step(), ProgressStep::Verifying);
    }
}
