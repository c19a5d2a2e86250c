//! Sequence Allocator
//!
//! Computes the next `(sequenceNumber, subNumber)` pair for a channel and
//! persists a monotonic counter so the same slot is never issued twice.
//!
//! The whole read-reconcile-increment-persist sequence runs inside one store
//! transaction, so two concurrent `reserve` calls for the same channel are
//! serialized by the shard lock. The `max(counter, maxSub)` reconciliation
//! is kept on top of that: if the persisted counter ever lags the recorded
//! submissions (a hard crash between increment and record), the next call
//! self-heals instead of reissuing a slot that is already in use.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::store::PathStore;

use super::proof::{display_proof_id, storage_proof_id, ChannelId};
use super::LedgerError;

/// A freshly issued proof slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Position within the channel's settlement order.
    pub sequence_number: u64,
    /// Tiebreaker among submissions contesting that position.
    pub sub_number: u64,
    /// Display identifier (`proof#<seq>` / `proof#<seq>-<sub>`).
    pub proof_id: String,
    /// Storage-safe identifier (`proof-<seq>` / `proof-<seq>-<sub>`).
    pub storage_proof_id: String,
}

/// Issues strictly-ordered proof slots per channel.
pub struct SequenceAllocator {
    store: Arc<PathStore>,
}

impl SequenceAllocator {
    /// Create an allocator over the shared store.
    pub fn new(store: Arc<PathStore>) -> Self {
        Self { store }
    }

    /// Reserve the next `(sequenceNumber, subNumber)` slot for `channel`.
    ///
    /// The sequence number is the count of verified proofs plus one: a
    /// verified proof advances the sequence exactly once, and the "current
    /// sequence" is always tied to ground truth rather than a separately
    /// maintained cursor.
    pub async fn reserve(&self, channel: &ChannelId) -> Result<Reservation, LedgerError> {
        self.store
            .transaction(channel.as_str(), |doc| {
                let verified_count = doc
                    .get(&["proofs", "verified"])
                    .and_then(Value::as_object)
                    .map(|m| m.len() as u64)
                    .unwrap_or(0);
                let sequence_number = verified_count + 1;

                // Highest sub-number already recorded for this sequence.
                let mut max_sub = 0u64;
                if let Some(submitted) = doc.get(&["proofs", "submitted"]).and_then(Value::as_object)
                {
                    for record in submitted.values() {
                        if record.get("sequenceNumber").and_then(Value::as_u64)
                            != Some(sequence_number)
                        {
                            continue;
                        }
                        if let Some(sub) = record.get("subNumber").and_then(Value::as_u64) {
                            max_sub = max_sub.max(sub);
                        }
                    }
                }

                let seq_key = sequence_number.to_string();
                let stored = doc
                    .get(&["counters", &seq_key])
                    .and_then(Value::as_u64)
                    .unwrap_or(0);

                let sub_number = stored.max(max_sub) + 1;
                doc.set(&["counters", &seq_key], json!(sub_number))?;

                Ok(Reservation {
                    sequence_number,
                    sub_number,
                    proof_id: display_proof_id(sequence_number, sub_number),
                    storage_proof_id: storage_proof_id(sequence_number, sub_number),
                })
            })
            .await
    }
}
