//! Watcher Snapshot Publisher (spec C9): periodically writes watcher
//! metadata into KV so other processes can observe it, since watcher
//! tasks communicate with the admin surface exclusively through this KV
//! namespace — never an in-memory channel (spec §9).

use crate::registry::{WatcherInfo, WatcherRegistry, WatcherStatus};
use chrono::{DateTime, Utc};
use kvutil::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A snapshot is considered live if observed within this long of its
/// `updated_at` (spec §3).
pub const WATCHER_SNAPSHOT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Running,
    Stopped,
    Error,
}

impl From<WatcherStatus> for SnapshotStatus {
    fn from(status: WatcherStatus) -> Self {
        match status {
            WatcherStatus::Running => SnapshotStatus::Running,
            WatcherStatus::Stopped => SnapshotStatus::Stopped,
            WatcherStatus::Error => SnapshotStatus::Error,
        }
    }
}

/// `WatcherInfo` plus the wall-clock moment it was published (spec §3
/// `WatcherSnapshot`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSnapshot {
    pub id: String,
    pub service: String,
    pub scope: String,
    pub kv_key: String,
    pub started_at: DateTime<Utc>,
    pub last_event: Option<DateTime<Utc>>,
    pub status: SnapshotStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WatcherSnapshot {
    pub fn from_info(info: &WatcherInfo) -> Self {
        Self {
            id: info.id.clone(),
            service: info.service.clone(),
            scope: info.scope.clone(),
            kv_key: info.kv_key.clone(),
            started_at: info.started_at,
            last_event: info.last_event,
            status: info.status.into(),
            last_error: info.last_error.clone(),
            updated_at: Utc::now(),
        }
    }

    /// `false` once `now - updated_at` exceeds [`WATCHER_SNAPSHOT_TTL`].
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match (now - self.updated_at).to_std() {
            Ok(age) => age <= WATCHER_SNAPSHOT_TTL,
            Err(_) => true, // updated_at is in the future (clock skew): treat as live.
        }
    }
}

/// `watchers/<service>/<instance_id>.json`; `instance_id` defaults to
/// `service` when empty (spec §4.9).
pub fn snapshot_key(service: &str, instance_id: &str) -> String {
    let instance = if instance_id.is_empty() { service } else { instance_id };
    format!("watchers/{service}/{instance}.json")
}

/// Stores `info`'s snapshot at `ttl=0` — open question (a) resolves to
/// embedding `updated_at` and letting readers compute staleness rather
/// than relying on a KV-backend TTL (spec §9).
pub async fn publish_watcher_snapshot(
    kv: &dyn KvStore,
    service: &str,
    instance_id: &str,
    info: &WatcherInfo,
) -> kvutil::Result<()> {
    let snapshot = WatcherSnapshot::from_info(info);
    let bytes = serde_json::to_vec(&snapshot).map_err(|e| kvutil::KvError::Other(e.into()))?;
    kv.put(&snapshot_key(service, instance_id), bytes, 0).await
}

/// Spawns a background task that republishes every locally-registered
/// watcher's snapshot on `interval` until the process exits.
pub fn spawn_snapshot_publisher(
    kv: Arc<dyn KvStore>,
    registry: Arc<WatcherRegistry>,
    instance_id: String,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for info in registry.list() {
                if let Err(err) = publish_watcher_snapshot(kv.as_ref(), &info.service, &instance_id, &info).await {
                    tracing::warn!(service = %info.service, error = %err, "failed to publish watcher snapshot");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvutil::InProcessKv;

    fn sample_info() -> WatcherInfo {
        WatcherInfo {
            id: "w1".into(),
            service: "core".into(),
            scope: "global".into(),
            kv_key: "config/core.json".into(),
            started_at: Utc::now(),
            last_event: None,
            status: WatcherStatus::Running,
            last_error: None,
        }
    }

    #[test]
    fn snapshot_key_defaults_instance_to_service() {
        assert_eq!(snapshot_key("core", ""), "watchers/core/core.json");
        assert_eq!(snapshot_key("core", "inst-1"), "watchers/core/inst-1.json");
    }

    #[tokio::test]
    async fn publish_stores_json_with_ttl_zero_semantics() {
        let kv = InProcessKv::new();
        publish_watcher_snapshot(&kv, "core", "", &sample_info()).await.unwrap();
        let entry = kv.get("watchers/core/core.json").await.unwrap();
        assert!(entry.found);
        let snap: WatcherSnapshot = serde_json::from_slice(&entry.value).unwrap();
        assert_eq!(snap.service, "core");
    }

    #[test]
    fn snapshot_is_live_within_ttl_and_stale_after() {
        let mut snap = WatcherSnapshot::from_info(&sample_info());
        assert!(snap.is_live(Utc::now()));

        snap.updated_at = Utc::now() - chrono::Duration::minutes(6);
        assert!(!snap.is_live(Utc::now()));
    }
}
