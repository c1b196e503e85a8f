//! Shared application state for the admin router, mirroring
//! `srql::state::AppState`'s `Clone`-cheap, `Arc`-wrapped shape.

use crate::config::AppConfig;
use crate::error::{Result, ServiceError};
use config_bootstrap::TemplateRegistry;
use kvutil::{InProcessKv, KvStore};
use std::collections::HashMap;
use std::sync::Arc;
use watcher_engine::WatcherEngine;

/// Service names whose config carries credential-shaped leaves that the
/// admin surface redacts on read and restores on write (spec §3/§4.10).
/// Field names, not dotted paths — redaction walks every nested list
/// item (`jobs`, unifi integration entries, …).
pub fn redaction_eligible_fields(service: &str) -> Option<&'static [&'static str]> {
    match service {
        "snmp-checker" => Some(&["community", "auth_passphrase", "priv_passphrase"]),
        "mapper" => Some(&["token", "api_key", "base_url_secret"]),
        _ => None,
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    default_kv: Arc<dyn KvStore>,
    kv_stores: Arc<HashMap<String, Arc<dyn KvStore>>>,
    pub templates: Arc<TemplateRegistry>,
    pub watchers: WatcherEngine,
}

impl AppState {
    pub fn new(config: AppConfig, default_kv: Arc<dyn KvStore>) -> Self {
        Self {
            config: Arc::new(config),
            default_kv,
            kv_stores: Arc::new(HashMap::new()),
            templates: Arc::new(TemplateRegistry::new()),
            watchers: WatcherEngine::new(),
        }
    }

    /// Convenience constructor for tests and single-process embedded
    /// deployments, backed by an [`InProcessKv`] (spec §9's
    /// "mock-for-tests"/"embedded" capability variants).
    pub fn embedded() -> Self {
        Self::new(AppConfig::embedded(), Arc::new(InProcessKv::new()))
    }

    /// Registers an additional named KV store, reachable by passing its
    /// id as `kv_store_id`/`kvStore` in a request (spec §6).
    pub fn with_kv_store(mut self, store_id: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Arc::make_mut(&mut self.kv_stores).insert(store_id.into(), store);
        self
    }

    /// Resolves a request's optional `kv_store_id` to a concrete
    /// capability, falling back to the process-default store (spec
    /// §4.1: "polymorphic over {in-process handle, remote gRPC endpoint
    /// keyed by store id}").
    pub fn resolve_kv(&self, store_id: Option<&str>) -> Result<Arc<dyn KvStore>> {
        match store_id {
            None => Ok(self.default_kv.clone()),
            Some(id) if id == self.config.default_kv_store_id => Ok(self.default_kv.clone()),
            Some(id) => self
                .kv_stores
                .get(id)
                .cloned()
                .ok_or_else(|| ServiceError::KvUnavailable(format!("unknown KV store id: {id}"))),
        }
    }

    pub fn default_kv(&self) -> Arc<dyn KvStore> {
        self.default_kv.clone()
    }
}
