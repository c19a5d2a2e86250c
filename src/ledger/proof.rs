//! Proof Records
//!
//! Domain types for the channel proof ledger: channel identifiers, proof
//! status, the proof record itself, and the two human-readable identifiers
//! derived from a `(sequenceNumber, subNumber)` pair.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::LedgerError;

/// A channel identifier, normalized to lowercase at construction.
///
/// Channels are case-insensitive everywhere; this newtype is the single
/// place the normalization happens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Normalize and validate a raw channel identifier.
    pub fn new(raw: &str) -> Result<Self, LedgerError> {
        let id = raw.trim().to_lowercase();
        if id.is_empty() {
            return Err(LedgerError::Validation(
                "channel identifier must not be empty".to_string(),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(LedgerError::Validation(format!(
                "channel identifier '{}' contains unsupported characters",
                id
            )));
        }
        Ok(Self(id))
    }

    /// The normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a proof currently lives in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    /// Recorded, awaiting adjudication.
    Submitted,
    /// Promoted as the winner for its sequence number.
    Verified,
    /// Superseded by a verified sibling.
    Rejected,
}

/// The three named proof collections per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Proofs awaiting adjudication.
    Submitted,
    /// The winners, one per sequence number.
    Verified,
    /// Everything superseded or declined.
    Rejected,
}

impl Collection {
    /// Store path segment for this collection.
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Submitted => "submitted",
            Collection::Verified => "verified",
            Collection::Rejected => "rejected",
        }
    }
}

/// Reference to a proof's binary artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Artifact bytes stored inline, base64-encoded.
    Inline {
        /// Base64 payload.
        data_b64: String,
        /// SHA-256 of the raw bytes, hex-encoded.
        sha256_hex: String,
    },
    /// Artifact stored externally, referenced by path.
    Stored {
        /// Location of the stored bytes.
        path: String,
        /// SHA-256 of the raw bytes, hex-encoded.
        sha256_hex: String,
    },
}

impl ArtifactRef {
    /// Build an inline reference from raw artifact bytes.
    pub fn inline(bytes: &[u8]) -> Self {
        ArtifactRef::Inline {
            data_b64: BASE64.encode(bytes),
            sha256_hex: hex::encode(Sha256::digest(bytes)),
        }
    }

    /// Hex digest of the referenced bytes.
    pub fn digest(&self) -> &str {
        match self {
            ArtifactRef::Inline { sha256_hex, .. } => sha256_hex,
            ArtifactRef::Stored { sha256_hex, .. } => sha256_hex,
        }
    }
}

/// A proof record, as stored in one of the three collections.
///
/// `sequence_number` and `sub_number` are assigned once by the sequence
/// allocator and immutable thereafter. Records move between collections only
/// via the adjudicator; the metadata timestamps stamped by the store
/// (`_createdAt`/`_updatedAt`) are deliberately absent from this struct and
/// ignored on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    /// Position within the channel's settlement order (>= 1).
    pub sequence_number: u64,
    /// Tiebreaker among concurrent submissions for one sequence (>= 1).
    pub sub_number: u64,
    /// Current state-machine position.
    pub status: ProofStatus,
    /// Display identifier (`proof#<seq>` or `proof#<seq>-<sub>`).
    pub proof_id: String,
    /// Storage-safe identifier (`proof-<seq>` or `proof-<seq>-<sub>`).
    pub storage_proof_id: String,
    /// Identity that submitted the proof.
    pub submitter: String,
    /// When the proof was recorded as submitted (RFC 3339).
    pub submitted_at: String,
    /// When the proof was verified, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
    /// Identity that verified the proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    /// When the proof was rejected, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<String>,
    /// Identity whose adjudication rejected the proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    /// Why the proof was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// The proof's binary artifact.
    pub artifact: ArtifactRef,
}

/// Display identifier for a `(sequenceNumber, subNumber)` pair.
pub fn display_proof_id(sequence_number: u64, sub_number: u64) -> String {
    if sub_number > 1 {
        format!("proof#{}-{}", sequence_number, sub_number)
    } else {
        format!("proof#{}", sequence_number)
    }
}

/// Storage-safe identifier for a `(sequenceNumber, subNumber)` pair,
/// usable as a collection key or filename stem.
pub fn storage_proof_id(sequence_number: u64, sub_number: u64) -> String {
    if sub_number > 1 {
        format!("proof-{}-{}", sequence_number, sub_number)
    } else {
        format!("proof-{}", sequence_number)
    }
}
