//! In-process [`KvStore`] used for embedded deployments and tests —
//! the "mock-for-tests" variant spec §9 requires alongside the remote
//! gRPC client.

use crate::{KvEntry, KvError, KvStore, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

type Watcher = Box<dyn FnMut(&[u8]) + Send>;

#[derive(Default)]
pub struct InProcessKv {
    entries: RwLock<BTreeMap<String, (Vec<u8>, u64)>>,
    watchers: RwLock<HashMap<String, Vec<Watcher>>>,
}

impl InProcessKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, key: &str, value: &[u8]) {
        if let Some(list) = self.watchers.write().get_mut(key) {
            for watcher in list.iter_mut() {
                watcher(value);
            }
        }
    }
}

#[async_trait]
impl KvStore for InProcessKv {
    async fn get(&self, key: &str) -> Result<KvEntry> {
        match self.entries.read().get(key) {
            Some((value, revision)) => Ok(KvEntry {
                value: value.clone(),
                found: true,
                revision: *revision,
            }),
            None => Ok(KvEntry::absent()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, _ttl_seconds: u64) -> Result<()> {
        let revision = {
            let mut entries = self.entries.write();
            let revision = entries.get(key).map(|(_, r)| r + 1).unwrap_or(1);
            entries.insert(key.to_string(), (value.clone(), revision));
            revision
        };
        let _ = revision;
        self.notify(key, &value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        self.notify(key, &[]);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn batch_get(&self, keys: &[String]) -> Result<HashMap<String, KvEntry>> {
        let entries = self.entries.read();
        Ok(keys
            .iter()
            .map(|key| {
                let entry = match entries.get(key) {
                    Some((value, revision)) => KvEntry {
                        value: value.clone(),
                        found: true,
                        revision: *revision,
                    },
                    None => KvEntry::absent(),
                };
                (key.clone(), entry)
            })
            .collect())
    }

    async fn watch_apply(&self, key: &str, apply: Box<dyn FnMut(&[u8]) + Send>) -> Result<()> {
        self.watchers
            .write()
            .entry(key.to_string())
            .or_default()
            .push(apply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let kv = InProcessKv::new();
        kv.put("a", b"1".to_vec(), 0).await.unwrap();
        let entry = kv.get("a").await.unwrap();
        assert!(entry.found);
        assert_eq!(entry.value, b"1");
        assert_eq!(entry.revision, 1);
    }

    #[tokio::test]
    async fn revision_is_monotonic() {
        let kv = InProcessKv::new();
        kv.put("a", b"1".to_vec(), 0).await.unwrap();
        kv.put("a", b"2".to_vec(), 0).await.unwrap();
        let entry = kv.get("a").await.unwrap();
        assert_eq!(entry.revision, 2);
    }

    #[tokio::test]
    async fn list_keys_scopes_by_prefix() {
        let kv = InProcessKv::new();
        kv.put("config/a.json", b"{}".to_vec(), 0).await.unwrap();
        kv.put("config/b.json", b"{}".to_vec(), 0).await.unwrap();
        kv.put("templates/a.json", b"{}".to_vec(), 0).await.unwrap();
        let keys = kv.list_keys("config/").await.unwrap();
        assert_eq!(keys, vec!["config/a.json", "config/b.json"]);
    }

    #[tokio::test]
    async fn watch_apply_fires_on_put_and_delete() {
        let kv = InProcessKv::new();
        let received = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recv = received.clone();
        kv.watch_apply(
            "a",
            Box::new(move |value| recv.lock().push(value.to_vec())),
        )
        .await
        .unwrap();

        kv.put("a", b"hello".to_vec(), 0).await.unwrap();
        kv.delete("a").await.unwrap();

        let events = received.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], b"hello");
        assert_eq!(events[1], Vec::<u8>::new());
    }

    #[tokio::test]
    async fn batch_get_reports_absent_keys() {
        let kv = InProcessKv::new();
        kv.put("present", b"x".to_vec(), 0).await.unwrap();
        let results = kv
            .batch_get(&["present".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(results["present"].found);
        assert!(!results["missing"].found);
    }
}
