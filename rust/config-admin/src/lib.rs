//! Admin Surface (spec C10) and Config Metadata Store (spec C11): an
//! HTTP control plane over the descriptor catalog, KV capability,
//! template registry, and watcher engine built by the sibling crates.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod redaction;
pub mod server;
pub mod state;
pub mod telemetry;

use crate::{config::AppConfig, server::Server, state::AppState};
use kvutil::KvClient;
use std::sync::Arc;
use std::time::Duration;

/// Bootstraps the admin surface using environment configuration and a
/// remote KV endpoint dialed via `kvutil::KvClient::connect_from_env`.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let kv_client = KvClient::connect_from_env().await?;
    let state = AppState::new(config.clone(), Arc::new(kv_client));

    watcher_engine::spawn_snapshot_publisher(
        state.default_kv(),
        state.watchers.registry(),
        config.instance_id.clone(),
        config.snapshot_publish_interval,
    );

    Server::new(state).run().await
}

/// Test/embedded-deployment bootstrap backed by an in-process KV store,
/// with no snapshot publisher or network listener (spec §9's
/// "mock-for-tests" capability variant).
pub fn embedded_state() -> AppState {
    AppState::embedded()
}

pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);
