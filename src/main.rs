//! SettleProof Server
//!
//! WebSocket entry point for the proof lifecycle engine.
//! Configuration comes from the environment; see the constants below.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use settleproof::engine::{EngineConfig, ProofEngine};
use settleproof::network::{ProofServer, ServerConfig};
use settleproof::VERSION;

/// Bind address, e.g. `0.0.0.0:8080`.
const ENV_BIND: &str = "SETTLEPROOF_BIND";
/// Directory for the per-channel store shards.
const ENV_DATA_DIR: &str = "SETTLEPROOF_DATA_DIR";
/// Path to the external prover binary.
const ENV_PROVER_BIN: &str = "SETTLEPROOF_PROVER_BIN";
/// Optional root for pipeline working directories.
const ENV_WORKDIR: &str = "SETTLEPROOF_WORKDIR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("SettleProof Server v{}", VERSION);

    let bind_addr: SocketAddr = std::env::var(ENV_BIND)
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .with_context(|| format!("{} is not a valid socket address", ENV_BIND))?;

    let data_dir = PathBuf::from(
        std::env::var(ENV_DATA_DIR).unwrap_or_else(|_| "./settleproof-data".to_string()),
    );
    let prover_binary = PathBuf::from(
        std::env::var(ENV_PROVER_BIN)
            .with_context(|| format!("{} must point at the prover binary", ENV_PROVER_BIN))?,
    );
    let workdir_root = std::env::var(ENV_WORKDIR).ok().map(PathBuf::from);

    info!("Data directory: {}", data_dir.display());
    info!("Prover binary: {}", prover_binary.display());

    let engine = Arc::new(ProofEngine::new(EngineConfig {
        data_dir,
        prover_binary,
        workdir_root,
    }));

    let server = ProofServer::new(
        ServerConfig {
            bind_addr,
            ..Default::default()
        },
        engine,
    );

    server.run().await.context("server terminated")?;
    Ok(())
}
