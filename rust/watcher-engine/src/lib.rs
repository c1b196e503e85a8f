//! Watcher Engine (spec C8) and Watcher Snapshot Publisher (spec C9):
//! generalizes `config_bootstrap::watch::ConfigWatcher`'s single-key
//! channel into a registry of concurrently running, independently
//! cancellable named watchers, and republishes their state into KV for
//! cross-process observability.

mod context;
mod engine;
mod error;
mod registry;
mod snapshot;

pub use context::{current_watcher_id, with_watcher_id};
pub use engine::WatcherEngine;
pub use error::{Result, WatcherError};
pub use registry::{WatcherInfo, WatcherRegistration, WatcherRegistry, WatcherStatus};
pub use snapshot::{
    publish_watcher_snapshot, snapshot_key, spawn_snapshot_publisher, SnapshotStatus,
    WatcherSnapshot, WATCHER_SNAPSHOT_TTL,
};
