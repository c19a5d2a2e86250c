//! Store Document
//!
//! In-memory JSON tree behind one store shard, with the five tree
//! operations (`get`/`set`/`update`/`push`/`delete`). Intermediate maps are
//! created on demand by writes. Every write of an object value stamps a
//! metadata timestamp: `_createdAt` for `push`, `_updatedAt` for
//! `set`/`update`. Metadata fields are ignored by all business reads.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::StoreError;

/// Metadata field stamped by `push`.
pub const CREATED_AT: &str = "_createdAt";

/// Metadata field stamped by `set` and `update`.
pub const UPDATED_AT: &str = "_updatedAt";

/// Current wall-clock time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// One shard's nested mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    root: Map<String, Value>,
}

impl Document {
    /// Read the value at `segments`, or the whole document for an empty path.
    pub fn get(&self, segments: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for (i, segment) in segments.iter().enumerate() {
            let value = current.get(*segment)?;
            if i == segments.len() - 1 {
                return Some(value);
            }
            current = value.as_object()?;
        }
        // Empty path: the root is not a borrowable Value, use as_value().
        None
    }

    /// Read the whole document as a JSON object.
    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Replace the value at `segments`, creating intermediate maps.
    ///
    /// Object values are stamped with `_updatedAt`.
    pub fn set(&mut self, segments: &[&str], mut value: Value) -> Result<(), StoreError> {
        let (parent, key) = Self::split_terminal(segments)?;
        stamp(&mut value, UPDATED_AT);
        let map = self.parent_map(parent)?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    /// Shallow-merge `partial` into the record at `segments`.
    ///
    /// If nothing exists at the path, or the existing value is not an
    /// object, behaves as `set`. Stamps `_updatedAt`.
    pub fn update(&mut self, segments: &[&str], partial: Value) -> Result<(), StoreError> {
        let (parent, key) = Self::split_terminal(segments)?;
        let map = self.parent_map(parent)?;

        match (map.get_mut(key), partial) {
            (Some(Value::Object(existing)), Value::Object(fields)) => {
                for (k, v) in fields {
                    existing.insert(k, v);
                }
                existing.insert(UPDATED_AT.to_string(), Value::String(now_rfc3339()));
                Ok(())
            }
            (_, partial) => self.set(segments, partial),
        }
    }

    /// Insert `value` under a fresh opaque key in the collection at
    /// `segments`, creating the collection on demand. Returns the key.
    ///
    /// Object values are stamped with `_createdAt`.
    pub fn push(&mut self, segments: &[&str], mut value: Value) -> Result<String, StoreError> {
        if segments.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        stamp(&mut value, CREATED_AT);
        let collection = self.parent_map(segments)?;
        let key = Uuid::new_v4().simple().to_string();
        collection.insert(key.clone(), value);
        Ok(key)
    }

    /// Remove the value at `segments`. Returns whether anything was removed.
    pub fn delete(&mut self, segments: &[&str]) -> Result<bool, StoreError> {
        let (parent, key) = Self::split_terminal(segments)?;

        // Walk without creating intermediates: deleting under an absent
        // branch is a no-op, not a write.
        let mut current = &mut self.root;
        for segment in parent {
            match current.get_mut(*segment) {
                Some(Value::Object(map)) => current = map,
                Some(_) => return Err(StoreError::PathConflict((*segment).to_string())),
                None => return Ok(false),
            }
        }
        Ok(current.remove(key).is_some())
    }

    fn split_terminal<'a>(segments: &'a [&'a str]) -> Result<(&'a [&'a str], &'a str), StoreError> {
        match segments.split_last() {
            Some((key, parent)) => Ok((parent, key)),
            None => Err(StoreError::EmptyPath),
        }
    }

    /// Navigate to the map at `segments`, creating intermediate maps.
    fn parent_map(&mut self, segments: &[&str]) -> Result<&mut Map<String, Value>, StoreError> {
        let mut current = &mut self.root;
        for segment in segments {
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(map) => current = map,
                _ => return Err(StoreError::PathConflict((*segment).to_string())),
            }
        }
        Ok(current)
    }
}

/// Stamp a metadata timestamp onto object values. Scalars pass through.
fn stamp(value: &mut Value, field: &str) {
    if let Value::Object(map) = value {
        map.insert(field.to_string(), Value::String(now_rfc3339()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let mut doc = Document::default();
        doc.set(&["proofs", "submitted", "p1"], json!({"sequenceNumber": 1}))
            .unwrap();

        let value = doc.get(&["proofs", "submitted", "p1"]).unwrap();
        assert_eq!(value["sequenceNumber"], 1);
        assert!(value.get(UPDATED_AT).is_some());
    }

    #[test]
    fn test_set_scalar_is_not_stamped() {
        let mut doc = Document::default();
        doc.set(&["counters", "3"], json!(2)).unwrap();
        assert_eq!(doc.get(&["counters", "3"]), Some(&json!(2)));
    }

    #[test]
    fn test_update_shallow_merges() {
        let mut doc = Document::default();
        doc.set(&["rec"], json!({"a": 1, "b": 2})).unwrap();
        doc.update(&["rec"], json!({"b": 3, "c": 4})).unwrap();

        let value = doc.get(&["rec"]).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], 3);
        assert_eq!(value["c"], 4);
    }

    #[test]
    fn test_update_absent_behaves_as_set() {
        let mut doc = Document::default();
        doc.update(&["rec"], json!({"a": 1})).unwrap();
        assert_eq!(doc.get(&["rec"]).unwrap()["a"], 1);
    }

    #[test]
    fn test_push_generates_unique_keys() {
        let mut doc = Document::default();
        let k1 = doc.push(&["items"], json!({"n": 1})).unwrap();
        let k2 = doc.push(&["items"], json!({"n": 2})).unwrap();
        assert_ne!(k1, k2);

        let items = doc.get(&["items"]).unwrap().as_object().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[&k1].get(CREATED_AT).is_some());
    }

    #[test]
    fn test_delete() {
        let mut doc = Document::default();
        doc.set(&["a", "b"], json!(1)).unwrap();
        assert!(doc.delete(&["a", "b"]).unwrap());
        assert!(!doc.delete(&["a", "b"]).unwrap());
        assert!(doc.get(&["a", "b"]).is_none());
    }

    #[test]
    fn test_delete_under_absent_branch_is_noop() {
        let mut doc = Document::default();
        assert!(!doc.delete(&["missing", "key"]).unwrap());
    }

    #[test]
    fn test_conflict_on_scalar_intermediate() {
        let mut doc = Document::default();
        doc.set(&["a"], json!(1)).unwrap();
        assert!(doc.set(&["a", "b"], json!(2)).is_err());
    }

    #[test]
    fn test_document_roundtrips_through_json() {
        let mut doc = Document::default();
        doc.set(&["x", "y"], json!({"z": true})).unwrap();

        let bytes = serde_json::to_vec(&doc).unwrap();
        let restored: Document = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.get(&["x", "y"]).unwrap()["z"], true);
    }
}
