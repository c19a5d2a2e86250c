//! Proof Registry
//!
//! CRUD over the three named proof collections per channel. The registry
//! performs no content validation; the submission handler validates the
//! artifact bundle before any record reaches this layer.

use std::sync::Arc;

use serde_json::Value;

use crate::store::PathStore;

use super::proof::{ChannelId, Collection, ProofRecord};
use super::LedgerError;

/// CRUD surface over a channel's proof collections.
pub struct ProofRegistry {
    store: Arc<PathStore>,
}

impl ProofRegistry {
    /// Create a registry over the shared store.
    pub fn new(store: Arc<PathStore>) -> Self {
        Self { store }
    }

    fn collection_path(channel: &ChannelId, collection: Collection) -> String {
        format!("{}.proofs.{}", channel, collection.as_str())
    }

    fn record_path(channel: &ChannelId, collection: Collection, key: &str) -> String {
        format!("{}.proofs.{}.{}", channel, collection.as_str(), key)
    }

    /// List every record in a collection, keyed, in stable key order.
    pub async fn list(
        &self,
        channel: &ChannelId,
        collection: Collection,
    ) -> Result<Vec<(String, ProofRecord)>, LedgerError> {
        let path = Self::collection_path(channel, collection);
        let value = match self.store.get(&path).await? {
            Some(value) => value,
            None => return Ok(Vec::new()),
        };

        let map = match value {
            Value::Object(map) => map,
            _ => {
                return Err(LedgerError::Validation(format!(
                    "'{}' is not a proof collection",
                    path
                )))
            }
        };

        let mut records = Vec::with_capacity(map.len());
        for (key, value) in map {
            let record: ProofRecord = serde_json::from_value(value)?;
            records.push((key, record));
        }
        Ok(records)
    }

    /// Fetch one record by key.
    pub async fn get(
        &self,
        channel: &ChannelId,
        collection: Collection,
        key: &str,
    ) -> Result<ProofRecord, LedgerError> {
        let path = Self::record_path(channel, collection, key);
        let value = self.store.get(&path).await?.ok_or_else(|| {
            LedgerError::NotFound(format!(
                "no {} proof '{}' in channel '{}'",
                collection.as_str(),
                key,
                channel
            ))
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Append a record under a store-generated opaque key. Returns the key.
    pub async fn put(
        &self,
        channel: &ChannelId,
        collection: Collection,
        record: &ProofRecord,
    ) -> Result<String, LedgerError> {
        let path = Self::collection_path(channel, collection);
        let value = serde_json::to_value(record)?;
        Ok(self.store.push(&path, value).await?)
    }

    /// Write a record under a caller-supplied key.
    pub async fn put_with_key(
        &self,
        channel: &ChannelId,
        collection: Collection,
        key: &str,
        record: &ProofRecord,
    ) -> Result<(), LedgerError> {
        let path = Self::record_path(channel, collection, key);
        let value = serde_json::to_value(record)?;
        Ok(self.store.set(&path, value).await?)
    }

    /// Remove one record by key.
    pub async fn delete(
        &self,
        channel: &ChannelId,
        collection: Collection,
        key: &str,
    ) -> Result<(), LedgerError> {
        let path = Self::record_path(channel, collection, key);
        if !self.store.delete(&path).await? {
            return Err(LedgerError::NotFound(format!(
                "no {} proof '{}' in channel '{}'",
                collection.as_str(),
                key,
                channel
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::proof::{
        display_proof_id, storage_proof_id, ArtifactRef, ProofStatus,
    };

    fn setup() -> (tempfile::TempDir, ProofRegistry, ChannelId) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PathStore::new(dir.path()));
        let registry = ProofRegistry::new(store);
        let channel = ChannelId::new("chan").unwrap();
        (dir, registry, channel)
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

    #[tokio::test]
    async fn test_put_get_roundtrip_preserves_business_fields() {
        let (_dir, registry, channel) = setup();
        let original = record(1, 1);

        registry
            .put_with_key(&channel, Collection::Submitted, "proof-1", &original)
            .await
            .unwrap();
        let loaded = registry
            .get(&channel, Collection::Submitted, "proof-1")
            .await
            .unwrap();

        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_put_auto_key() {
        let (_dir, registry, channel) = setup();

        let key = registry
            .put(&channel, Collection::Submitted, &record(1, 1))
            .await
            .unwrap();
        assert!(!key.is_empty());

        let loaded = registry
            .get(&channel, Collection::Submitted, &key)
            .await
            .unwrap();
        assert_eq!(loaded.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_list_empty_collection() {
        let (_dir, registry, channel) = setup();
        let records = registry
            .list(&channel, Collection::Verified)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_all_entries() {
        let (_dir, registry, channel) = setup();

        registry
            .put_with_key(&channel, Collection::Submitted, "proof-1", &record(1, 1))
            .await
            .unwrap();
        registry
            .put_with_key(&channel, Collection::Submitted, "proof-1-2", &record(1, 2))
            .await
            .unwrap();

        let records = registry
            .list(&channel, Collection::Submitted)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, registry, channel) = setup();
        let err = registry
            .get(&channel, Collection::Submitted, "proof-9")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, registry, channel) = setup();
        let err = registry
            .delete(&channel, Collection::Rejected, "proof-9")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_collections_are_disjoint() {
        let (_dir, registry, channel) = setup();

        registry
            .put_with_key(&channel, Collection::Submitted, "proof-1", &record(1, 1))
            .await
            .unwrap();

        assert!(registry
            .get(&channel, Collection::Verified, "proof-1")
            .await
            .is_err());
        assert!(registry
            .get(&channel, Collection::Rejected, "proof-1")
            .await
            .is_err());
    }
}
