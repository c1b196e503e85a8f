//! Watcher registry (spec C8 state): per-watcher bookkeeping protected by
//! a reader/writer lock — list takes a shared lock, register/update/stop
//! take an exclusive lock (spec §5). Snapshots handed back to callers are
//! deep-copied.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// `running -> event(ok) -> running`; `running -> event(err) -> error`;
/// `error -> event(ok) -> running`; `{running,error} -> cancel|stream_close
/// -> stopped`. Terminal: `stopped` (spec §4 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    Running,
    Stopped,
    Error,
}

/// Caller-supplied shape for `RegisterWatcher` (spec §3 `WatcherRegistration`).
#[derive(Debug, Clone)]
pub struct WatcherRegistration {
    pub service: String,
    pub scope: String,
    pub kv_key: String,
}

/// In-memory watcher state (spec §3 `WatcherInfo`).
#[derive(Debug, Clone)]
pub struct WatcherInfo {
    pub id: String,
    pub service: String,
    pub scope: String,
    pub kv_key: String,
    pub started_at: DateTime<Utc>,
    pub last_event: Option<DateTime<Utc>>,
    pub status: WatcherStatus,
    pub last_error: Option<String>,
}

/// Module-level watcher state: allocated at init-time, mutated under a
/// lock for the process lifetime (spec §9).
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: RwLock<HashMap<String, WatcherInfo>>,
    cancels: RwLock<HashMap<String, oneshot::Sender<()>>>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a unique id, records `started_at = now_utc`,
    /// `status = running`, and stores the cancellation sender so a later
    /// `stop` can fire it (spec §4.8).
    pub(crate) fn register(
        &self,
        reg: &WatcherRegistration,
        cancel_tx: oneshot::Sender<()>,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let info = WatcherInfo {
            id: id.clone(),
            service: reg.service.clone(),
            scope: reg.scope.clone(),
            kv_key: reg.kv_key.clone(),
            started_at: Utc::now(),
            last_event: None,
            status: WatcherStatus::Running,
            last_error: None,
        };
        self.watchers.write().insert(id.clone(), info);
        self.cancels.write().insert(id.clone(), cancel_tx);
        id
    }

    /// Shared-lock snapshot of every tracked watcher, deep-copied.
    pub fn list(&self) -> Vec<WatcherInfo> {
        self.watchers.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<WatcherInfo> {
        self.watchers.read().get(id).cloned()
    }

    pub(crate) fn mark_event_ok(&self, id: &str) {
        if let Some(info) = self.watchers.write().get_mut(id) {
            info.last_event = Some(Utc::now());
            info.status = WatcherStatus::Running;
            info.last_error = None;
        }
    }

    pub(crate) fn mark_event_err(&self, id: &str, error: String) {
        if let Some(info) = self.watchers.write().get_mut(id) {
            info.status = WatcherStatus::Error;
            info.last_error = Some(error);
        }
    }

    /// Transitions `{running,error} -> stopped`. `last_error` is left as
    /// whatever it was unless `error` names a non-benign cause (spec
    /// §4.8: "marks the watcher stopped... unless the cause is a benign
    /// cancellation").
    pub(crate) fn mark_stopped(&self, id: &str, error: Option<String>) {
        if let Some(info) = self.watchers.write().get_mut(id) {
            info.status = WatcherStatus::Stopped;
            if let Some(error) = error {
                info.last_error = Some(error);
            }
        }
    }

    /// Fires the watcher's cancellation signal, if it is still running.
    /// Returns `true` when a signal was sent.
    pub fn stop(&self, id: &str) -> bool {
        match self.cancels.write().remove(id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub(crate) fn clear_cancel(&self, id: &str) {
        self.cancels.write().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_sets_running_status() {
        let reg = WatcherRegistry::new();
        let (tx, _rx) = oneshot::channel();
        let id = reg.register(
            &WatcherRegistration {
                service: "core".into(),
                scope: "global".into(),
                kv_key: "config/core.json".into(),
            },
            tx,
        );
        let info = reg.get(&id).unwrap();
        assert_eq!(info.status, WatcherStatus::Running);
        assert!(info.last_event.is_none());
    }

    #[test]
    fn list_deep_copies_entries() {
        let reg = WatcherRegistry::new();
        let (tx, _rx) = oneshot::channel();
        let id = reg.register(
            &WatcherRegistration {
                service: "core".into(),
                scope: "global".into(),
                kv_key: "config/core.json".into(),
            },
            tx,
        );
        let mut snapshot = reg.list();
        snapshot[0].service = "mutated".into();
        assert_eq!(reg.get(&id).unwrap().service, "core");
    }

    #[test]
    fn event_transitions_follow_the_state_machine() {
        let reg = WatcherRegistry::new();
        let (tx, _rx) = oneshot::channel();
        let id = reg.register(
            &WatcherRegistration {
                service: "core".into(),
                scope: "global".into(),
                kv_key: "config/core.json".into(),
            },
            tx,
        );

        reg.mark_event_ok(&id);
        assert_eq!(reg.get(&id).unwrap().status, WatcherStatus::Running);

        reg.mark_event_err(&id, "boom".into());
        let info = reg.get(&id).unwrap();
        assert_eq!(info.status, WatcherStatus::Error);
        assert_eq!(info.last_error.as_deref(), Some("boom"));

        reg.mark_event_ok(&id);
        assert_eq!(reg.get(&id).unwrap().status, WatcherStatus::Running);
        assert!(reg.get(&id).unwrap().last_error.is_none());

        reg.mark_event_err(&id, "boom again".into());
        reg.mark_stopped(&id, None);
        let info = reg.get(&id).unwrap();
        assert_eq!(info.status, WatcherStatus::Stopped);
        assert_eq!(info.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn stop_fires_cancel_signal_once() {
        let reg = WatcherRegistry::new();
        let (tx, rx) = oneshot::channel();
        let id = reg.register(
            &WatcherRegistration {
                service: "core".into(),
                scope: "global".into(),
                kv_key: "config/core.json".into(),
            },
            tx,
        );
        assert!(reg.stop(&id));
        assert!(rx.try_recv().is_ok());
        assert!(!reg.stop(&id));
    }
}
