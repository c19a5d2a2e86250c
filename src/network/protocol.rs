//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Every frame
//! is one JSON message terminated by a newline; the progress stream for a
//! generation request is a sequence of such frames ending with exactly one
//! terminal `completed` or `error` event.

use serde::{Deserialize, Serialize};

use crate::engine::SubmitReceipt;
use crate::ledger::{Adjudication, Collection, LedgerError, ProofRecord, Reservation};
use crate::pipeline::ProgressEvent;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Reserve the next proof slot for a channel.
    Reserve {
        /// Channel identifier (case-insensitive).
        channel: String,
    },

    /// Record a proof submission against a reserved slot.
    Submit(SubmitRequest),

    /// Promote a winning submission, rejecting its siblings.
    Adjudicate(AdjudicateRequest),

    /// List a channel's proofs in one collection.
    ListProofs {
        /// Channel identifier.
        channel: String,
        /// Which collection to list.
        collection: Collection,
    },

    /// Fetch one proof by key.
    GetProof {
        /// Channel identifier.
        channel: String,
        /// Which collection to read.
        collection: Collection,
        /// Collection key.
        key: String,
    },

    /// Start a generation pipeline run; progress streams back on this
    /// connection.
    Generate(GenerateRequest),

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Proof submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Channel identifier.
    pub channel: String,
    /// Submitter identity string.
    pub submitter: String,
    /// Reserved sequence number.
    pub sequence_number: u64,
    /// Reserved sub-number.
    pub sub_number: u64,
    /// Packed artifact bundle, base64-encoded.
    pub artifact_bytes: String,
}

/// Adjudication payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjudicateRequest {
    /// Channel identifier.
    pub channel: String,
    /// Collection key of the winning submission.
    pub winning_key: String,
    /// Sequence number being settled.
    pub sequence_number: u64,
    /// Verifier identity string.
    pub verifier: String,
}

/// Generation request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Channel identifier.
    pub channel: String,
    /// Run the full proving branch, not just synthesis.
    #[serde(default)]
    pub include_proof: bool,
    /// Transaction payload for the synthesize stage.
    pub transaction: serde_json::Value,
}

impl ClientRequest {
    /// Parse a request from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// One keyed proof record on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofEntry {
    /// Collection key.
    pub key: String,
    /// The record.
    pub record: ProofRecord,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    /// A freshly reserved slot.
    Reserved(Reservation),

    /// Submission recorded.
    Submitted(SubmitReceipt),

    /// Adjudication outcome.
    Adjudicated(Adjudication),

    /// Collection listing.
    Proofs {
        /// Channel identifier (normalized).
        channel: String,
        /// Which collection was listed.
        collection: Collection,
        /// The records.
        entries: Vec<ProofEntry>,
    },

    /// One proof record.
    Proof(ProofEntry),

    /// One unit of a generation run's progress stream.
    Progress(ProgressEvent),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall clock, milliseconds since the epoch.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Error categories surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame was not a valid request.
    InvalidRequest,
    /// Malformed or missing required request fields.
    Validation,
    /// Referenced proof or collection does not exist.
    NotFound,
    /// A pipeline stage failed or timed out.
    Prover,
    /// The store failed to persist.
    Store,
    /// Anything else.
    Internal,
}

impl ServerResponse {
    /// Serialize to one newline-terminated JSON text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Build the error response for a ledger failure.
    pub fn from_ledger_error(err: &LedgerError) -> Self {
        let code = match err {
            LedgerError::Validation(_) => ErrorCode::Validation,
            LedgerError::NotFound(_) => ErrorCode::NotFound,
            LedgerError::Corrupt(_) => ErrorCode::Internal,
            LedgerError::Store(_) => ErrorCode::Store,
        };
        ServerResponse::Error(ServerError {
            code,
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserve_request_parses() {
        let request =
            ClientRequest::from_json(r#"{"type": "reserve", "channel": "Chan"}"#).unwrap();
        assert!(matches!(request, ClientRequest::Reserve { channel } if channel == "Chan"));
    }

    #[test]
    fn test_generate_request_defaults_include_proof() {
        let request = ClientRequest::from_json(
            r#"{"type": "generate", "channel": "chan", "transaction": {}}"#,
        )
        .unwrap();
        match request {
            ClientRequest::Generate(req) => assert!(!req.include_proof),
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_reservation_response_wire_shape() {
        let response = ServerResponse::Reserved(Reservation {
            sequence_number: 2,
            sub_number: 2,
            proof_id: "proof#2-2".to_string(),
            storage_proof_id: "proof-2-2".to_string(),
        });

        let frame = response.to_frame().unwrap();
        assert!(frame.ends_with('\n'));

        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "reserved");
        assert_eq!(json["sequenceNumber"], 2);
        assert_eq!(json["subNumber"], 2);
        assert_eq!(json["proofId"], "proof#2-2");
        assert_eq!(json["storageProofId"], "proof-2-2");
    }

    #[test]
    fn test_adjudication_response_wire_shape() {
        let response = ServerResponse::Adjudicated(Adjudication {
            verified_proof: crate::ledger::adjudicate::VerifiedProofRef {
                proof_id: "proof#3".to_string(),
                sequence_number: 3,
            },
            rejected_count: 1,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "adjudicated");
        assert_eq!(json["verifiedProof"]["proofId"], "proof#3");
        assert_eq!(json["verifiedProof"]["sequenceNumber"], 3);
        assert_eq!(json["rejectedCount"], 1);
    }

    #[test]
    fn test_error_code_mapping() {
        let not_found = LedgerError::NotFound("x".to_string());
        match ServerResponse::from_ledger_error(&not_found) {
            ServerResponse::Error(e) => assert_eq!(e.code, ErrorCode::NotFound),
            _ => panic!("expected error"),
        }

        let validation = LedgerError::Validation("y".to_string());
        match ServerResponse::from_ledger_error(&validation) {
            ServerResponse::Error(e) => assert_eq!(e.code, ErrorCode::Validation),
            _ => panic!("expected error"),
        }
    }

    #[test]
    fn test_submit_request_roundtrip() {
        let original = ClientRequest::Submit(SubmitRequest {
            channel: "chan".to_string(),
            submitter: "0xalice".to_string(),
            sequence_number: 1,
            sub_number: 1,
            artifact_bytes: "YWJj".to_string(),
        });

        let text = serde_json::to_string(&original).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "submit");
        assert_eq!(json["sequenceNumber"], 1);

        let parsed = ClientRequest::from_json(&text).unwrap();
        assert!(matches!(parsed, ClientRequest::Submit(_)));
    }

    #[test]
    fn test_progress_frame() {
        let response = ServerResponse::Progress(ProgressEvent::status(
            crate::pipeline::ProgressStep::Proving,
            "constructing proof",
        ));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["step"], "proving");
    }

    #[test]
    fn test_invalid_frame_rejected() {
        assert!(ClientRequest::from_json("not json").is_err());
        assert!(ClientRequest::from_json(json!({"type": "warp"}).to_string().as_str()).is_err());
    }
}
