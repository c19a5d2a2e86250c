//! Channel Proof Ledger
//!
//! The persistent half of the proof lifecycle engine: sequence allocation,
//! the three per-channel proof collections, and the one-shot verification
//! transition. Everything here is built on the path store; the multi-step
//! sequences (reserve, adjudicate) run inside a single store transaction so
//! concurrent callers and crashes can never observe a partial write.

pub mod adjudicate;
pub mod bundle;
pub mod proof;
pub mod registry;
pub mod sequence;

use crate::store::StoreError;

pub use adjudicate::{Adjudication, Adjudicator, REJECT_REASON_SUPERSEDED};
pub use bundle::{validate_bundle, BundleCodec, JsonManifestCodec};
pub use proof::{ArtifactRef, ChannelId, Collection, ProofRecord, ProofStatus};
pub use registry::ProofRegistry;
pub use sequence::{Reservation, SequenceAllocator};

/// Ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or missing required request fields. No side effects.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced proof or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored record no longer deserializes.
    #[error("stored record corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The path store failed underneath. Fatal, never retried.
    #[error(transparent)]
    Store(#[from] StoreError),
}
