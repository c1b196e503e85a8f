//! KV capability (spec C1): get/put/delete/watch/list/batch-get over an
//! ordered key space, polymorphic over a remote gRPC endpoint, an
//! in-process store, and a mock usable in tests.

mod client;
mod mock;
mod overlay;

pub use client::KvClient;
pub use mock::InProcessKv;
pub use overlay::{overlay_json, overlay_toml};

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod kvproto {
    tonic::include_proto!("proto");
}

#[derive(Error, Debug)]
pub enum KvError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, KvError>;

/// A single KV read: opaque bytes plus presence and the backend's
/// monotonic revision (spec §3 `KVEntry`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub found: bool,
    pub revision: u64,
}

impl KvEntry {
    pub fn absent() -> Self {
        Self::default()
    }
}

/// The polymorphic KV capability described in spec §4.1 / §9: admin and
/// watcher code talk to this trait, never to a concrete transport, so
/// {embedded, remote, mock-for-tests} are interchangeable.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<KvEntry>;
    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
    async fn batch_get(&self, keys: &[String]) -> Result<HashMap<String, KvEntry>>;

    /// Subscribe to updates for `key`; `apply` is invoked once per event,
    /// with an empty slice signalling a delete or empty update (spec §4.8).
    /// Implementations own the subscription's lifetime.
    async fn watch_apply(&self, key: &str, apply: Box<dyn FnMut(&[u8]) + Send>) -> Result<()>;
}
