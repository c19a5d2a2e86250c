//! Proof Engine Facade
//!
//! Wires the store, ledger, and pipeline together behind one surface the
//! network layer talks to. Also owns the per-channel pipeline lock: two
//! generation requests for one channel are serialized here, while distinct
//! channels run in parallel.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::ledger::bundle::{validate_bundle, BundleCodec, JsonManifestCodec};
use crate::ledger::{
    Adjudication, Adjudicator, ArtifactRef, ChannelId, Collection, LedgerError, ProofRecord,
    ProofRegistry, ProofStatus, Reservation, SequenceAllocator,
};
use crate::pipeline::{Orchestrator, PipelineJob, ProgressEvent, Prover, ProverCommand};
use crate::store::document::now_rfc3339;
use crate::store::PathStore;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the per-channel store shards.
    pub data_dir: PathBuf,
    /// Path to the external prover binary.
    pub prover_binary: PathBuf,
    /// Root for pipeline working directories (system temp when unset).
    pub workdir_root: Option<PathBuf>,
}

/// Receipt returned for a recorded submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    /// Collection key the record lives under.
    pub key: String,
    /// Display identifier.
    pub proof_id: String,
    /// Storage-safe identifier.
    pub storage_proof_id: String,
    /// The slot the submission occupies.
    pub sequence_number: u64,
    /// Slot tiebreaker.
    pub sub_number: u64,
}

/// The proof lifecycle engine.
pub struct ProofEngine {
    store: Arc<PathStore>,
    allocator: SequenceAllocator,
    registry: ProofRegistry,
    adjudicator: Adjudicator,
    orchestrator: Arc<Orchestrator>,
    codec: Arc<dyn BundleCodec>,
    pipeline_locks: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl ProofEngine {
    /// Build an engine from configuration, with the real prover subprocess
    /// adapter and the default artifact codec.
    pub fn new(config: EngineConfig) -> Self {
        let prover: Arc<dyn Prover> = Arc::new(ProverCommand::new(&config.prover_binary));
        let codec: Arc<dyn BundleCodec> = Arc::new(JsonManifestCodec);
        Self::with_parts(
            Arc::new(PathStore::new(&config.data_dir)),
            prover,
            codec,
            config.workdir_root,
        )
    }

    /// Build an engine from explicit collaborators (tests use a scripted
    /// prover here).
    pub fn with_parts(
        store: Arc<PathStore>,
        prover: Arc<dyn Prover>,
        codec: Arc<dyn BundleCodec>,
        workdir_root: Option<PathBuf>,
    ) -> Self {
        let mut orchestrator = Orchestrator::new(prover, codec.clone());
        if let Some(root) = workdir_root {
            orchestrator = orchestrator.with_workdir_root(root);
        }

        Self {
            allocator: SequenceAllocator::new(store.clone()),
            registry: ProofRegistry::new(store.clone()),
            adjudicator: Adjudicator::new(store.clone()),
            orchestrator: Arc::new(orchestrator),
            codec,
            pipeline_locks: Mutex::new(BTreeMap::new()),
            store,
        }
    }

    /// Reserve the next proof slot for a channel.
    pub async fn reserve(&self, channel: &str) -> Result<Reservation, LedgerError> {
        let channel = ChannelId::new(channel)?;
        let reservation = self.allocator.reserve(&channel).await?;
        info!(
            "channel '{}': reserved slot {} (sub {})",
            channel, reservation.sequence_number, reservation.sub_number
        );
        Ok(reservation)
    }

    /// Record a proof submission against a previously reserved slot.
    ///
    /// Validates the artifact bundle and checks that the slot was actually
    /// issued by the allocator before the registry is touched.
    pub async fn submit(
        &self,
        channel: &str,
        submitter: &str,
        sequence_number: u64,
        sub_number: u64,
        artifact_b64: &str,
    ) -> Result<SubmitReceipt, LedgerError> {
        let channel = ChannelId::new(channel)?;
        if submitter.trim().is_empty() {
            return Err(LedgerError::Validation(
                "submitter identity must not be empty".to_string(),
            ));
        }
        if sequence_number < 1 || sub_number < 1 {
            return Err(LedgerError::Validation(
                "sequenceNumber and subNumber must be positive".to_string(),
            ));
        }

        let blob = BASE64
            .decode(artifact_b64.as_bytes())
            .map_err(|_| LedgerError::Validation("artifact is not valid base64".to_string()))?;
        let files = self.codec.unpack(&blob)?;
        validate_bundle(&files)?;

        let proof_id = crate::ledger::proof::display_proof_id(sequence_number, sub_number);
        let storage_proof_id = crate::ledger::proof::storage_proof_id(sequence_number, sub_number);
        let record = ProofRecord {
            sequence_number,
            sub_number,
            status: ProofStatus::Submitted,
            proof_id: proof_id.clone(),
            storage_proof_id: storage_proof_id.clone(),
            submitter: submitter.to_string(),
            submitted_at: now_rfc3339(),
            verified_at: None,
            verified_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            artifact: ArtifactRef::inline(&blob),
        };
        let record_value = serde_json::to_value(&record)?;

        // The issued-slot check, the occupancy check, and the write share one
        // transaction: a concurrent submit for the same slot cannot
        // interleave between them.
        let seq_key = sequence_number.to_string();
        self.store
            .transaction(channel.as_str(), |doc| {
                // The slot must have been issued: the persisted counter
                // covers it.
                let issued = doc
                    .get(&["counters", &seq_key])
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if issued < sub_number {
                    return Err(LedgerError::Validation(format!(
                        "slot ({}, {}) was never reserved for channel '{}'",
                        sequence_number, sub_number, channel
                    )));
                }

                // A slot's key is written once; after that only the
                // adjudicator moves the record.
                for collection in ["submitted", "verified", "rejected"] {
                    if doc
                        .get(&["proofs", collection, &storage_proof_id])
                        .is_some()
                    {
                        return Err(LedgerError::Validation(format!(
                            "slot ({}, {}) in channel '{}' already holds a {} proof",
                            sequence_number, sub_number, channel, collection
                        )));
                    }
                }

                doc.set(&["proofs", "submitted", &storage_proof_id], record_value)?;
                Ok(())
            })
            .await?;

        info!("channel '{}': {} submitted by {}", channel, proof_id, submitter);
        Ok(SubmitReceipt {
            key: storage_proof_id.clone(),
            proof_id,
            storage_proof_id,
            sequence_number,
            sub_number,
        })
    }

    /// Promote a winning submission and reject its siblings.
    pub async fn adjudicate(
        &self,
        channel: &str,
        winning_key: &str,
        sequence_number: u64,
        verifier: &str,
    ) -> Result<Adjudication, LedgerError> {
        let channel = ChannelId::new(channel)?;
        self.adjudicator
            .adjudicate(&channel, winning_key, sequence_number, verifier)
            .await
    }

    /// List a channel's proofs in one collection.
    pub async fn list_proofs(
        &self,
        channel: &str,
        collection: Collection,
    ) -> Result<Vec<(String, ProofRecord)>, LedgerError> {
        let channel = ChannelId::new(channel)?;
        self.registry.list(&channel, collection).await
    }

    /// Fetch one proof by key.
    pub async fn get_proof(
        &self,
        channel: &str,
        collection: Collection,
        key: &str,
    ) -> Result<ProofRecord, LedgerError> {
        let channel = ChannelId::new(channel)?;
        self.registry.get(&channel, collection, key).await
    }

    /// Start a generation pipeline run, returning its progress stream.
    ///
    /// The run executes on its own task; dropping the receiver cancels it
    /// between stages. Runs for the same channel queue on a per-channel
    /// lock.
    pub async fn generate(
        &self,
        channel: &str,
        include_proof: bool,
        transaction: serde_json::Value,
    ) -> Result<mpsc::Receiver<ProgressEvent>, LedgerError> {
        let channel = ChannelId::new(channel)?;
        let lock = self.pipeline_lock(&channel).await;
        let orchestrator = self.orchestrator.clone();
        let (tx, rx) = mpsc::channel(64);

        let job = PipelineJob {
            channel,
            include_proof,
            transaction,
        };

        tokio::spawn(async move {
            let _guard = lock.lock().await;
            orchestrator.run(job, tx).await;
        });

        Ok(rx)
    }

    async fn pipeline_lock(&self, channel: &ChannelId) -> Arc<Mutex<()>> {
        let mut locks = self.pipeline_locks.lock().await;
        locks
            .entry(channel.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
