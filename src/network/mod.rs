//! Network Layer
//!
//! WebSocket server for browser dashboard communication.
//! This layer is transport only - all lifecycle logic runs through `engine`.

pub mod protocol;
pub mod server;

pub use protocol::{
    AdjudicateRequest, ClientRequest, ErrorCode, GenerateRequest, ProofEntry, ServerError,
    ServerResponse, SubmitRequest,
};
pub use server::{ProofServer, ProofServerError, ServerConfig};
