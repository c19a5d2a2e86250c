//! Verification Adjudicator
//!
//! The one-shot state transition: promote a winning submission to
//! `verified`, move every sibling contesting the same sequence number to
//! `rejected`, and clear the sibling set out of `submitted`.
//!
//! The whole transition runs inside a single store transaction, so a crash
//! or a concurrent reader can never observe a proof duplicated across
//! collections. Re-running with the same winning key fails with NotFound
//! (the winner is no longer in `submitted`) and leaves the store untouched:
//! adjudication is deliberately not idempotent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::store::document::now_rfc3339;
use crate::store::PathStore;

use super::proof::{ChannelId, ProofRecord, ProofStatus};
use super::LedgerError;

/// Reason code stamped on every sibling rejected by an adjudication.
pub const REJECT_REASON_SUPERSEDED: &str = "superseded by a verified sibling";

/// Identifying fields of the promoted proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedProofRef {
    /// Display identifier of the winner.
    pub proof_id: String,
    /// Sequence number the winner settled.
    pub sequence_number: u64,
}

/// Outcome of one adjudication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjudication {
    /// The promoted proof.
    pub verified_proof: VerifiedProofRef,
    /// How many siblings were moved to `rejected`.
    pub rejected_count: u64,
}

/// Executes the submitted → verified/rejected transition.
pub struct Adjudicator {
    store: Arc<PathStore>,
}

impl Adjudicator {
    /// Create an adjudicator over the shared store.
    pub fn new(store: Arc<PathStore>) -> Self {
        Self { store }
    }

    /// Promote `winning_key` for `sequence_number`, rejecting its siblings.
    pub async fn adjudicate(
        &self,
        channel: &ChannelId,
        winning_key: &str,
        sequence_number: u64,
        verifier: &str,
    ) -> Result<Adjudication, LedgerError> {
        if verifier.trim().is_empty() {
            return Err(LedgerError::Validation(
                "verifier identity must not be empty".to_string(),
            ));
        }

        let outcome = self
            .store
            .transaction(channel.as_str(), |doc| {
                let submitted = doc
                    .get(&["proofs", "submitted"])
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();

                let winner_value = submitted.get(winning_key).ok_or_else(|| {
                    LedgerError::NotFound(format!(
                        "no submitted proof '{}' in channel '{}'",
                        winning_key, channel
                    ))
                })?;
                let winner: ProofRecord = serde_json::from_value(winner_value.clone())?;

                if winner.sequence_number != sequence_number {
                    return Err(LedgerError::Validation(format!(
                        "proof '{}' carries sequence {} but adjudication targets {}",
                        winning_key, winner.sequence_number, sequence_number
                    )));
                }

                let now = now_rfc3339();
                let mut rejected_count = 0u64;
                let mut verified_proof = None;

                for (key, value) in &submitted {
                    let mut record: ProofRecord = serde_json::from_value(value.clone())?;
                    if record.sequence_number != sequence_number {
                        continue;
                    }

                    if key == winning_key {
                        record.status = ProofStatus::Verified;
                        record.verified_at = Some(now.clone());
                        record.verified_by = Some(verifier.to_string());
                        verified_proof = Some(VerifiedProofRef {
                            proof_id: record.proof_id.clone(),
                            sequence_number,
                        });
                        doc.set(&["proofs", "verified", key], serde_json::to_value(&record)?)?;
                    } else {
                        record.status = ProofStatus::Rejected;
                        record.rejected_at = Some(now.clone());
                        record.rejected_by = Some(verifier.to_string());
                        record.rejection_reason = Some(REJECT_REASON_SUPERSEDED.to_string());
                        doc.set(&["proofs", "rejected", key], serde_json::to_value(&record)?)?;
                        rejected_count += 1;
                    }

                    doc.delete(&["proofs", "submitted", key])?;
                }

                let verified_proof = verified_proof.ok_or_else(|| {
                    LedgerError::NotFound(format!(
                        "no submitted proof '{}' in channel '{}'",
                        winning_key, channel
                    ))
                })?;

                Ok(Adjudication {
                    verified_proof,
                    rejected_count,
                })
            })
            .await?;

        info!(
            "channel '{}': {} verified at sequence {}, {} sibling(s) rejected",
            channel, outcome.verified_proof.proof_id, sequence_number, outcome.rejected_count
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::proof::{
        display_proof_id, storage_proof_id, ArtifactRef, Collection,
    };
    use crate::ledger::registry::ProofRegistry;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: ProofRegistry,
        adjudicator: Adjudicator,
        channel: ChannelId,
    }

    fn setup() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PathStore::new(dir.path()));
        Fixture {
            _dir: dir,
            registry: ProofRegistry::new(store.clone()),
            adjudicator: Adjudicator::new(store),
            channel: ChannelId::new("chan").unwrap(),
        }
    }

    fn record(seq: u64, sub: u64) -> ProofRecord {
        ProofRecord {
            sequence_number: seq,
            sub_number: sub,
            status: ProofStatus::Submitted,
            proof_id: display_proof_id(seq, sub),
            storage_proof_id: storage_proof_id(seq, sub),
            submitter: "0xsubmitter".to_string(),
            submitted_at: "2026-01-01T00:00:00Z".to_string(),
            verified_at: None,
            verified_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            artifact: ArtifactRef::inline(b"bytes"),
        }
    }

    async fn submit(fx: &Fixture, key: &str, seq: u64, sub: u64) {
        fx.registry
            .put_with_key(&fx.channel, Collection::Submitted, key, &record(seq, sub))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_winner_promoted_siblings_rejected() {
        let fx = setup();
        submit(&fx, "proof-3", 3, 1).await;
        submit(&fx, "proof-3-2", 3, 2).await;

        let outcome = fx
            .adjudicator
            .adjudicate(&fx.channel, "proof-3", 3, "0xverifier")
            .await
            .unwrap();

        assert_eq!(outcome.rejected_count, 1);
        assert_eq!(outcome.verified_proof.proof_id, "proof#3");
        assert_eq!(outcome.verified_proof.sequence_number, 3);

        let winner = fx
            .registry
            .get(&fx.channel, Collection::Verified, "proof-3")
            .await
            .unwrap();
        assert_eq!(winner.status, ProofStatus::Verified);
        assert_eq!(winner.verified_by.as_deref(), Some("0xverifier"));
        assert!(winner.verified_at.is_some());

        let loser = fx
            .registry
            .get(&fx.channel, Collection::Rejected, "proof-3-2")
            .await
            .unwrap();
        assert_eq!(loser.status, ProofStatus::Rejected);
        assert_eq!(
            loser.rejection_reason.as_deref(),
            Some(REJECT_REASON_SUPERSEDED)
        );
        assert_eq!(loser.rejected_by.as_deref(), Some("0xverifier"));

        // Submitted is empty for this sequence.
        let remaining = fx
            .registry
            .list(&fx.channel, Collection::Submitted)
            .await
            .unwrap();
        assert!(remaining.iter().all(|(_, r)| r.sequence_number != 3));
    }

    #[tokio::test]
    async fn test_unrelated_sequences_untouched() {
        let fx = setup();
        submit(&fx, "proof-3", 3, 1).await;
        submit(&fx, "proof-4", 4, 1).await;

        fx.adjudicator
            .adjudicate(&fx.channel, "proof-3", 3, "0xverifier")
            .await
            .unwrap();

        let other = fx
            .registry
            .get(&fx.channel, Collection::Submitted, "proof-4")
            .await
            .unwrap();
        assert_eq!(other.status, ProofStatus::Submitted);
    }

    #[tokio::test]
    async fn test_second_adjudication_fails_and_changes_nothing() {
        let fx = setup();
        submit(&fx, "proof-3", 3, 1).await;
        submit(&fx, "proof-3-2", 3, 2).await;

        fx.adjudicator
            .adjudicate(&fx.channel, "proof-3", 3, "0xverifier")
            .await
            .unwrap();

        let verified_before = fx
            .registry
            .list(&fx.channel, Collection::Verified)
            .await
            .unwrap();
        let rejected_before = fx
            .registry
            .list(&fx.channel, Collection::Rejected)
            .await
            .unwrap();

        let err = fx
            .adjudicator
            .adjudicate(&fx.channel, "proof-3", 3, "0xverifier")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let verified_after = fx
            .registry
            .list(&fx.channel, Collection::Verified)
            .await
            .unwrap();
        let rejected_after = fx
            .registry
            .list(&fx.channel, Collection::Rejected)
            .await
            .unwrap();
        assert_eq!(verified_before, verified_after);
        assert_eq!(rejected_before, rejected_after);
    }

    #[tokio::test]
    async fn test_unknown_winner_is_not_found() {
        let fx = setup();
        let err = fx
            .adjudicator
            .adjudicate(&fx.channel, "proof-9", 9, "0xverifier")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sequence_mismatch_is_validation_error() {
        let fx = setup();
        submit(&fx, "proof-3", 3, 1).await;

        let err = fx
            .adjudicator
            .adjudicate(&fx.channel, "proof-3", 4, "0xverifier")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        // No side effects: the proof is still submitted.
        let record = fx
            .registry
            .get(&fx.channel, Collection::Submitted, "proof-3")
            .await
            .unwrap();
        assert_eq!(record.status, ProofStatus::Submitted);
    }

    #[tokio::test]
    async fn test_exactly_one_verified_per_sequence() {
        let fx = setup();
        submit(&fx, "a", 3, 1).await;
        submit(&fx, "b", 3, 2).await;
        submit(&fx, "c", 3, 3).await;

        let outcome = fx
            .adjudicator
            .adjudicate(&fx.channel, "b", 3, "0xverifier")
            .await
            .unwrap();
        assert_eq!(outcome.rejected_count, 2);

        let verified = fx
            .registry
            .list(&fx.channel, Collection::Verified)
            .await
            .unwrap();
        let at_seq: Vec<_> = verified
            .iter()
            .filter(|(_, r)| r.sequence_number == 3)
            .collect();
        assert_eq!(at_seq.len(), 1);
        assert_eq!(at_seq[0].0, "b");
    }
}
