//! Path Store
//!
//! Process-wide, tree-structured key/value store addressed by dotted paths,
//! with timestamped records. Everything else in the engine is built on it.
//!
//! The store is sharded by the first path segment (the channel identifier):
//! each shard is one JSON document persisted to `<data_dir>/<shard>.json`.
//! Every shard has its own async mutex; a write locks the shard, mutates the
//! in-memory document, persists it synchronously (write-temp-then-rename),
//! and only then returns. Unrelated channels never contend, and the
//! read-modify-write cost of one operation is bounded by one channel's data.
//!
//! [`PathStore::transaction`] runs a whole closure under the shard lock and
//! persists once on success. The sequence allocator and the adjudicator use
//! it to make their multi-step read-then-write sequences atomic.

pub mod document;
pub mod path;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error};

pub use document::Document;
pub use path::StorePath;

/// Path store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Empty path or empty path segment.
    #[error("empty store path")]
    EmptyPath,

    /// An intermediate path segment holds a non-map value.
    #[error("path segment '{0}' is not a map")]
    PathConflict(String),

    /// The backing document failed to load or persist.
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document is not valid JSON.
    #[error("store document corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One shard slot: `None` until first loaded from disk.
type ShardSlot = Arc<Mutex<Option<Document>>>;

/// Sharded, disk-backed path store.
pub struct PathStore {
    data_dir: PathBuf,
    shards: Mutex<BTreeMap<String, ShardSlot>>,
}

impl PathStore {
    /// Open a store rooted at `data_dir`. Shards load lazily on first access.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            shards: Mutex::new(BTreeMap::new()),
        }
    }

    /// Read the value at `path`, or `None` when absent.
    pub async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = StorePath::parse(path)?;
        let slot = self.shard_slot(path.shard()).await;
        let mut guard = slot.lock().await;
        let doc = self.load_shard(path.shard(), &mut guard).await?;

        let rest = path.rest();
        if rest.is_empty() {
            return Ok(Some(doc.as_value()));
        }
        Ok(doc.get(&rest).cloned())
    }

    /// Replace the value at `path`, stamping `_updatedAt` on object values.
    pub async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = StorePath::parse(path)?;
        let rest = path.rest();
        self.transaction(path.shard(), |doc| doc.set(&rest, value))
            .await
    }

    /// Shallow-merge `partial` into the record at `path` (absent: as `set`).
    pub async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> {
        let path = StorePath::parse(path)?;
        let rest = path.rest();
        self.transaction(path.shard(), |doc| doc.update(&rest, partial))
            .await
    }

    /// Store `value` under a fresh opaque key in the collection at `path`.
    pub async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let path = StorePath::parse(path)?;
        let rest = path.rest();
        self.transaction(path.shard(), |doc| doc.push(&rest, value))
            .await
    }

    /// Remove the value at `path`. Returns whether anything was removed.
    pub async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        let path = StorePath::parse(path)?;
        let rest = path.rest();
        self.transaction(path.shard(), |doc| doc.delete(&rest))
            .await
    }

    /// Run `f` over the shard document under the shard lock, persisting once
    /// on success.
    ///
    /// If `f` fails, or persistence fails, the in-memory document is rolled
    /// back to its pre-transaction state, so memory never diverges from disk.
    pub async fn transaction<T, E, F>(&self, shard: &str, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut Document) -> Result<T, E>,
    {
        let slot = self.shard_slot(shard).await;
        let mut guard = slot.lock().await;
        let doc = self.load_shard(shard, &mut guard).await?;

        let snapshot = doc.clone();
        match f(doc) {
            Ok(value) => match self.persist_shard(shard, doc).await {
                Ok(()) => Ok(value),
                Err(e) => {
                    error!("failed to persist shard '{}': {}", shard, e);
                    *doc = snapshot;
                    Err(E::from(e))
                }
            },
            Err(e) => {
                *doc = snapshot;
                Err(e)
            }
        }
    }

    /// Look up or create the lock slot for a shard.
    async fn shard_slot(&self, shard: &str) -> ShardSlot {
        let mut shards = self.shards.lock().await;
        shards
            .entry(shard.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Load the shard document from disk on first access.
    async fn load_shard<'a>(
        &self,
        shard: &str,
        slot: &'a mut Option<Document>,
    ) -> Result<&'a mut Document, StoreError> {
        if slot.is_none() {
            let file = self.shard_file(shard);
            let doc = match tokio::fs::read(&file).await {
                Ok(bytes) => serde_json::from_slice(&bytes)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("shard '{}' starts empty", shard);
                    Document::default()
                }
                Err(e) => return Err(e.into()),
            };
            *slot = Some(doc);
        }

        match slot.as_mut() {
            Some(doc) => Ok(doc),
            // Unreachable: populated above.
            None => Err(StoreError::EmptyPath),
        }
    }

    /// Persist a shard document: write to a temp file, then rename over the
    /// target so a crash never exposes a partial write.
    async fn persist_shard(&self, shard: &str, doc: &Document) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let bytes = serde_json::to_vec_pretty(doc)?;
        let target = self.shard_file(shard);
        let tmp = self.data_dir.join(format!(".{}.tmp", sanitize(shard)));

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    fn shard_file(&self, shard: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", sanitize(shard)))
    }

    /// Directory holding the shard documents.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Map a shard name to a filesystem-safe stem.
fn sanitize(shard: &str) -> String {
    shard
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
