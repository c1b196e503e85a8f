//! Watcher Engine (spec C8): registers long-lived watches, ticks events
//! onto a log sink or an in-process configuration overlay, and tears the
//! watch down on cancellation.
//!
//! Scheduling model: many independent cooperative tasks, one per watched
//! key, running concurrently on the shared tokio scheduler (spec §4.8/§5).
//! Suspension happens at the event-sequence receive, the cancellation
//! receive, and (for overlay watchers) the destination lock acquire.

use crate::context::with_watcher_id;
use crate::error::Result;
use crate::registry::{WatcherRegistration, WatcherRegistry};
use config_bootstrap::{overlay_bytes, ConfigFormat};
use kvutil::KvStore;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Owns the watcher registry and spawns watcher tasks against it. Cheap
/// to clone — the registry itself is the only shared state.
#[derive(Clone, Default)]
pub struct WatcherEngine {
    registry: Arc<WatcherRegistry>,
}

impl WatcherEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> Arc<WatcherRegistry> {
        self.registry.clone()
    }

    pub fn list(&self) -> Vec<crate::registry::WatcherInfo> {
        self.registry.list()
    }

    /// Cancels the named watcher. Returns `false` if no such watcher is
    /// registered (it may have already stopped and been reaped).
    pub fn stop(&self, watcher_id: &str) -> bool {
        self.registry.stop(watcher_id)
    }

    /// Subscribes to `reg.kv_key` and invokes `logger(key, bytes)` for
    /// every non-empty event (spec §4.8 `StartLog`). Owns `kv`'s lifetime
    /// for the duration of the watch; releases it on shutdown.
    pub async fn start_log<F>(&self, kv: Arc<dyn KvStore>, reg: WatcherRegistration, logger: F) -> Result<String>
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let id = self.registry.register(&reg, cancel_tx);
        let registry = self.registry.clone();
        let key = reg.kv_key.clone();

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Err(err) = kv.watch_apply(&key, Box::new(move |bytes| {
            let _ = tx.send(bytes.to_vec());
        })).await {
            registry.mark_stopped(&id, Some(err.to_string()));
            return Err(err.into());
        }

        let watcher_id = id.clone();
        tokio::spawn(with_watcher_id(watcher_id.clone(), async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        registry.mark_stopped(&watcher_id, None);
                        break;
                    }
                    event = rx.recv() => {
                        match event {
                            None => {
                                registry.mark_stopped(&watcher_id, None);
                                break;
                            }
                            Some(bytes) if bytes.is_empty() => {
                                tracing::info!(watcher_id = %watcher_id, key = %key, "delete or empty update");
                            }
                            Some(bytes) => {
                                logger(&key, &bytes);
                                registry.mark_event_ok(&watcher_id);
                            }
                        }
                    }
                }
            }
            registry.clear_cancel(&watcher_id);
            drop(kv);
        }));

        Ok(id)
    }

    /// Performs an initial fetch+overlay onto `destination`, then
    /// subscribes to `reg.kv_key` and applies each subsequent update with
    /// the same overlay semantics (spec §4.8 `StartOverlay`). `on_change`
    /// fires after every successful overlay, including the initial one.
    pub async fn start_overlay<T, F>(
        &self,
        kv: Arc<dyn KvStore>,
        reg: WatcherRegistration,
        destination: Arc<RwLock<T>>,
        format: ConfigFormat,
        on_change: F,
    ) -> Result<String>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn() + Send + Sync + 'static,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let id = self.registry.register(&reg, cancel_tx);
        let registry = self.registry.clone();
        let key = reg.kv_key.clone();

        match kv.get(&key).await {
            Ok(entry) if entry.found => {
                let applied = {
                    let mut dest = destination.write();
                    overlay_bytes(&mut *dest, &entry.value, format)
                };
                match applied {
                    Ok(()) => {
                        registry.mark_event_ok(&id);
                        on_change();
                    }
                    Err(err) => registry.mark_event_err(&id, err.to_string()),
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(watcher_id = %id, key = %key, error = %err, "initial overlay fetch failed");
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Err(err) = kv.watch_apply(&key, Box::new(move |bytes| {
            let _ = tx.send(bytes.to_vec());
        })).await {
            registry.mark_stopped(&id, Some(err.to_string()));
            return Err(err.into());
        }

        let watcher_id = id.clone();
        tokio::spawn(with_watcher_id(watcher_id.clone(), async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        registry.mark_stopped(&watcher_id, None);
                        break;
                    }
                    event = rx.recv() => {
                        match event {
                            None => {
                                registry.mark_stopped(&watcher_id, None);
                                break;
                            }
                            Some(bytes) if bytes.is_empty() => {
                                tracing::info!(watcher_id = %watcher_id, key = %key, "delete or empty update");
                            }
                            Some(bytes) => {
                                let applied = {
                                    let mut dest = destination.write();
                                    overlay_bytes(&mut *dest, &bytes, format)
                                };
                                match applied {
                                    Ok(()) => {
                                        registry.mark_event_ok(&watcher_id);
                                        on_change();
                                    }
                                    Err(err) => registry.mark_event_err(&watcher_id, err.to_string()),
                                }
                            }
                        }
                    }
                }
            }
            registry.clear_cancel(&watcher_id);
            drop(kv);
        }));

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::WatcherStatus;
    use kvutil::InProcessKv;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct Cfg {
        #[serde(default)]
        value: i32,
    }

    #[tokio::test]
    async fn start_overlay_applies_initial_value_and_fires_callback() {
        let kv = InProcessKv::new();
        kv.put("config/test.json", br#"{"value":7}"#.to_vec(), 0).await.unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(kv);

        let engine = WatcherEngine::new();
        let destination = Arc::new(RwLock::new(Cfg::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let id = engine
            .start_overlay(
                kv,
                WatcherRegistration {
                    service: "test".into(),
                    scope: "global".into(),
                    kv_key: "config/test.json".into(),
                },
                destination.clone(),
                ConfigFormat::Json,
                move || {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await
            .unwrap();

        assert_eq!(destination.read().value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let info = engine.registry().get(&id).unwrap();
        assert_eq!(info.status, WatcherStatus::Running);
    }

    #[tokio::test]
    async fn start_overlay_applies_subsequent_updates() {
        let kv_inner = InProcessKv::new();
        let kv: Arc<dyn KvStore> = Arc::new(kv_inner);

        let engine = WatcherEngine::new();
        let destination = Arc::new(RwLock::new(Cfg::default()));

        engine
            .start_overlay(
                kv.clone(),
                WatcherRegistration {
                    service: "test".into(),
                    scope: "global".into(),
                    kv_key: "config/test.json".into(),
                },
                destination.clone(),
                ConfigFormat::Json,
                || {},
            )
            .await
            .unwrap();

        kv.put("config/test.json", br#"{"value":42}"#.to_vec(), 0)
            .await
            .unwrap();

        // Give the spawned task a scheduling slot to process the event.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(destination.read().value, 42);
    }

    #[tokio::test]
    async fn stop_transitions_watcher_to_stopped() {
        let kv: Arc<dyn KvStore> = Arc::new(InProcessKv::new());
        let engine = WatcherEngine::new();

        let id = engine
            .start_log(kv, WatcherRegistration {
                service: "test".into(),
                scope: "global".into(),
                kv_key: "config/test.json".into(),
            }, |_, _| {})
            .await
            .unwrap();

        assert!(engine.stop(&id));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(engine.registry().get(&id).unwrap().status, WatcherStatus::Stopped);
    }
}
