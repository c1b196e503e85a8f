//! Config Metadata Store (spec C11): a parallel KV namespace at
//! `<key>.meta` recording origin, last writer, and update time. Writes
//! are best-effort (log on failure, never fail the underlying config
//! write); reads are best-effort (origin = `unknown` on any failure).

use chrono::{DateTime, Utc};
use kvutil::KvStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Seeded,
    User,
    Unknown,
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadataRecord {
    pub origin: Origin,
    #[serde(default)]
    pub writer: String,
    pub updated_at: DateTime<Utc>,
}

impl ConfigMetadataRecord {
    pub fn new(origin: Origin, writer: impl Into<String>) -> Self {
        Self {
            origin,
            writer: writer.into(),
            updated_at: Utc::now(),
        }
    }
}

pub fn metadata_key(config_key: &str) -> String {
    format!("{config_key}.meta")
}

/// Best-effort metadata write: failures are logged, never propagated
/// (spec §4.11).
pub async fn record_metadata(kv: &dyn KvStore, config_key: &str, origin: Origin, writer: &str) {
    let record = ConfigMetadataRecord::new(origin, writer);
    let bytes = match serde_json::to_vec(&record) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(config_key, error = %err, "failed to serialize metadata record");
            return;
        }
    };
    if let Err(err) = kv.put(&metadata_key(config_key), bytes, 0).await {
        tracing::warn!(config_key, error = %err, "failed to record config metadata");
    }
}

/// Best-effort metadata read: absence or any failure yields
/// `origin = unknown` (spec §4.11).
pub async fn read_metadata(kv: &dyn KvStore, config_key: &str) -> ConfigMetadataRecord {
    match kv.get(&metadata_key(config_key)).await {
        Ok(entry) if entry.found => match serde_json::from_slice(&entry.value) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(config_key, error = %err, "failed to parse metadata record");
                ConfigMetadataRecord::new(Origin::Unknown, "")
            }
        },
        Ok(_) => ConfigMetadataRecord::new(Origin::Unknown, ""),
        Err(err) => {
            tracing::warn!(config_key, error = %err, "failed to read config metadata");
            ConfigMetadataRecord::new(Origin::Unknown, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvutil::InProcessKv;

    #[tokio::test]
    async fn record_then_read_round_trips() {
        let kv = InProcessKv::new();
        record_metadata(&kv, "config/core.json", Origin::Seeded, "system").await;

        let record = read_metadata(&kv, "config/core.json").await;
        assert_eq!(record.origin, Origin::Seeded);
        assert_eq!(record.writer, "system");
    }

    #[tokio::test]
    async fn read_is_unknown_when_absent() {
        let kv = InProcessKv::new();
        let record = read_metadata(&kv, "config/missing.json").await;
        assert_eq!(record.origin, Origin::Unknown);
    }

    #[test]
    fn metadata_key_appends_suffix() {
        assert_eq!(metadata_key("config/core.json"), "config/core.json.meta");
    }
}
