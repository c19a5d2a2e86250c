//! # SettleProof Server
//!
//! Proof lifecycle engine for an off-chain payment channel dashboard.
//! Tracks proof submissions per channel, allocates contested sequence
//! slots, drives the external cryptographic prover pipeline, and settles
//! each slot by promoting one verified proof and rejecting its siblings.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SETTLEPROOF SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  store/              - Persistence                           │
//! │  ├── path.rs         - Dotted path addressing                │
//! │  ├── document.rs     - JSON document mutation + timestamps   │
//! │  └── mod.rs          - Per-channel sharded file store        │
//! │                                                              │
//! │  ledger/             - Proof lifecycle (transactional)       │
//! │  ├── proof.rs        - Records, identifiers, channels        │
//! │  ├── sequence.rs     - Contested slot allocation             │
//! │  ├── registry.rs     - Collection CRUD                       │
//! │  ├── adjudicate.rs   - One-shot verified/rejected settlement │
//! │  └── bundle.rs       - Artifact packing and validation       │
//! │                                                              │
//! │  pipeline/           - Proof generation (subprocess)         │
//! │  ├── stage.rs        - Stage contract and timeouts           │
//! │  ├── prover.rs       - External prover adapter               │
//! │  ├── signatures.rs   - Failure classification                │
//! │  └── orchestrator.rs - Stage sequencing + progress stream    │
//! │                                                              │
//! │  engine.rs           - Facade wiring the layers together     │
//! │                                                              │
//! │  network/            - Transport (WebSocket)                 │
//! │  ├── protocol.rs     - Message types                         │
//! │  └── server.rs       - Connection handling and dispatch      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle Guarantee
//!
//! The `ledger/` operations are **transactional per channel**:
//! - Slot reservation reads and writes its counter atomically
//! - Adjudication moves a whole sibling set in one store write
//! - A failed write rolls the in-memory document back to disk state
//!
//! A proof record is created as `submitted` and leaves that collection
//! exactly once, for `verified` or `rejected`, never both.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod engine;
pub mod ledger;
pub mod network;
pub mod pipeline;
pub mod store;

// Re-export commonly used types
pub use engine::{EngineConfig, ProofEngine, SubmitReceipt};
pub use ledger::{Adjudication, ChannelId, Collection, ProofRecord, ProofStatus, Reservation};
pub use network::{ProofServer, ServerConfig};
pub use pipeline::{ProgressEvent, ProgressStep};
pub use store::PathStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
