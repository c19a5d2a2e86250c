//! Artifact Bundles
//!
//! Submission-time validation of the named-file proof bundle, plus the seam
//! to the archive codec. The codec itself is an external collaborator: the
//! engine only needs "named files to blob and back", so it is a trait here,
//! with a JSON-manifest implementation that keeps the engine runnable and
//! testable without an external archiver.
//!
//! Validation happens before the registry is ever invoked; the registry
//! stores whatever it is given.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use super::LedgerError;

/// Required bundle member: public instance columns.
pub const INSTANCE_FILE: &str = "instance.json";

/// Required bundle member: the proof entries.
pub const PROOF_FILE: &str = "proof.json";

/// Required bundle member: channel state snapshot.
pub const STATE_SNAPSHOT_FILE: &str = "state_snapshot.json";

/// How deep inside the bundle a required file may be nested.
pub const MAX_BUNDLE_DEPTH: usize = 3;

/// Named files in and out of a packed artifact blob.
pub type BundleFiles = BTreeMap<String, Vec<u8>>;

/// Black-box codec converting a named-file bundle to/from a byte blob.
pub trait BundleCodec: Send + Sync {
    /// Pack named files into one blob.
    fn pack(&self, files: &BundleFiles) -> Result<Vec<u8>, LedgerError>;

    /// Unpack a blob into named files.
    fn unpack(&self, blob: &[u8]) -> Result<BundleFiles, LedgerError>;
}

/// Codec encoding the bundle as a JSON object of base64 members.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonManifestCodec;

impl BundleCodec for JsonManifestCodec {
    fn pack(&self, files: &BundleFiles) -> Result<Vec<u8>, LedgerError> {
        let manifest: BTreeMap<&str, String> = files
            .iter()
            .map(|(name, bytes)| (name.as_str(), BASE64.encode(bytes)))
            .collect();
        Ok(serde_json::to_vec(&manifest)?)
    }

    fn unpack(&self, blob: &[u8]) -> Result<BundleFiles, LedgerError> {
        let manifest: BTreeMap<String, String> = serde_json::from_slice(blob)
            .map_err(|_| LedgerError::Validation("artifact blob is not a bundle".to_string()))?;

        let mut files = BundleFiles::new();
        for (name, encoded) in manifest {
            let bytes = BASE64.decode(encoded.as_bytes()).map_err(|_| {
                LedgerError::Validation(format!("bundle member '{}' is not base64", name))
            })?;
            files.insert(name, bytes);
        }
        Ok(files)
    }
}

/// Validate the shape of a submission bundle.
///
/// The three required files must be present within [`MAX_BUNDLE_DEPTH`]
/// directory levels and carry their required fields.
pub fn validate_bundle(files: &BundleFiles) -> Result<(), LedgerError> {
    let instance = required_json(files, INSTANCE_FILE)?;
    require_array(&instance, "a_pub_user", INSTANCE_FILE)?;
    require_array(&instance, "a_pub_block", INSTANCE_FILE)?;
    require_array(&instance, "a_pub_function", INSTANCE_FILE)?;

    let proof = required_json(files, PROOF_FILE)?;
    require_array(&proof, "proof_entries_part1", PROOF_FILE)?;
    require_array(&proof, "proof_entries_part2", PROOF_FILE)?;

    let snapshot = required_json(files, STATE_SNAPSHOT_FILE)?;
    require_string(&snapshot, "stateRoot", STATE_SNAPSHOT_FILE)?;
    require_string(&snapshot, "contractAddress", STATE_SNAPSHOT_FILE)?;
    require_array(&snapshot, "registeredKeys", STATE_SNAPSHOT_FILE)?;
    require_array(&snapshot, "storageEntries", STATE_SNAPSHOT_FILE)?;

    Ok(())
}

/// Locate a required file at a bounded nesting depth and parse it as JSON.
fn required_json(files: &BundleFiles, name: &str) -> Result<Value, LedgerError> {
    let bytes = files
        .iter()
        .find(|(member, _)| {
            let parts: Vec<&str> = member.split('/').collect();
            parts.len() <= MAX_BUNDLE_DEPTH + 1 && parts.last() == Some(&name)
        })
        .map(|(_, bytes)| bytes)
        .ok_or_else(|| {
            LedgerError::Validation(format!("bundle is missing required file '{}'", name))
        })?;

    serde_json::from_slice(bytes)
        .map_err(|_| LedgerError::Validation(format!("'{}' is not valid JSON", name)))
}

fn require_array(value: &Value, field: &str, file: &str) -> Result<(), LedgerError> {
    match value.get(field) {
        Some(Value::Array(_)) => Ok(()),
        _ => Err(LedgerError::Validation(format!(
            "'{}' is missing array field '{}'",
            file, field
        ))),
    }
}

fn require_string(value: &Value, field: &str, file: &str) -> Result<(), LedgerError> {
    match value.get(field) {
        Some(Value::String(_)) => Ok(()),
        _ => Err(LedgerError::Validation(format!(
            "'{}' is missing string field '{}'",
            file, field
        ))),
    }
}
