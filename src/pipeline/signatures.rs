//! Failure Signatures
//!
//! The external prover has no structured error channel: a stage can exit 0
//! and still have failed, with the only evidence a known substring on its
//! error stream. This module owns the signature table and the extraction of
//! the human-readable fragment, so new signatures can be added without
//! touching the orchestrator.

/// Phrases on the verify stage's standard output that confirm success.
///
/// Matching is case-insensitive. Absence of all phrases fails verification
/// even when the process exited cleanly.
pub const VERIFIED_PHRASES: &[&str] = &[
    "verification ok",
    "verification passed",
    "proof is valid",
];

/// Known failure markers scanned on the combined error stream.
const DEFAULT_MARKERS: &[&str] = &[
    "step error:",
    "handler error:",
    "output data mismatch",
    "undefined handler",
];

/// Matches subprocess error-stream text against known failure signatures.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    markers: Vec<String>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl FailureClassifier {
    /// Extend the table with an additional marker.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    /// Scan error-stream text for the first known failure signature.
    ///
    /// Returns the extracted message fragment: the text following the marker
    /// on its line, or the whole trimmed line when nothing follows.
    pub fn classify(&self, stderr: &str) -> Option<String> {
        for line in stderr.lines() {
            for marker in &self.markers {
                if let Some(idx) = line.find(marker.as_str()) {
                    let fragment = line[idx + marker.len()..].trim();
                    if fragment.is_empty() {
                        return Some(line.trim().to_string());
                    }
                    return Some(fragment.to_string());
                }
            }
        }
        None
    }
}

/// Whether verify-stage stdout confirms a successful verification.
pub fn stdout_confirms_verified(stdout: &str) -> bool {
    let lowered = stdout.to_lowercase();
    VERIFIED_PHRASES.iter().any(|p| lowered.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_fragment_extracted() {
        let classifier = FailureClassifier::default();
        let detail = classifier
            .classify("Synthesizer: step error: X")
            .unwrap();
        assert_eq!(detail, "X");
    }

    #[test]
    fn test_first_matching_line_wins() {
        let classifier = FailureClassifier::default();
        let stderr = "warming up\nHandler: handler error: bad opcode\nstep error: later";
        assert_eq!(classifier.classify(stderr).unwrap(), "bad opcode");
    }

    #[test]
    fn test_bare_marker_yields_whole_line() {
        let classifier = FailureClassifier::default();
        let detail = classifier
            .classify("trace check: output data mismatch")
            .unwrap();
        assert_eq!(detail, "trace check: output data mismatch");
    }

    #[test]
    fn test_undefined_handler_detected() {
        let classifier = FailureClassifier::default();
        let detail = classifier
            .classify("runtime: undefined handler for opcode 0x42")
            .unwrap();
        assert_eq!(detail, "for opcode 0x42");
    }

    #[test]
    fn test_clean_stderr_matches_nothing() {
        let classifier = FailureClassifier::default();
        assert!(classifier.classify("synthesized 1842 constraints\n").is_none());
        assert!(classifier.classify("").is_none());
    }

    #[test]
    fn test_added_marker_is_honored() {
        let classifier = FailureClassifier::default().with_marker("panic:");
        assert_eq!(
            classifier.classify("worker panic: index out of range").unwrap(),
            "index out of range"
        );
    }

    #[test]
    fn test_verified_phrases() {
        assert!(stdout_confirms_verified("... Verification OK\n"));
        assert!(stdout_confirms_verified("proof is VALID"));
        assert!(stdout_confirms_verified("verification passed in 12ms"));
        assert!(!stdout_confirms_verified("verification attempted"));
        assert!(!stdout_confirms_verified(""));
    }
}
