//! Placeholder Repairer (spec C7): one-shot reconciliation that overwrites
//! obviously-placeholder KV content with a sanitized on-disk default.
//!
//! A failed repair is logged and swallowed (spec §7: "a failed placeholder
//! repair is silently swallowed... so it never blocks service startup"),
//! so this never returns an error to the caller.

use crate::sanitize::{needs_repair, sanitize_json, SanitizationRules};
use kvutil::KvStore;
use serde::Serialize;

/// Reads the current KV bytes at `kv_key`; if unreadable, absent, or
/// present without a placeholder critical field, this is a no-op.
/// Otherwise sanitizes `live_cfg` and writes it only if the sanitized
/// bytes differ byte-for-byte from what's stored (spec §4.7).
pub async fn repair_config_placeholders<T>(
    kv: &dyn KvStore,
    kv_key: &str,
    critical_fields: &[&str],
    live_cfg: &T,
    rules: &SanitizationRules,
    live_jwt_private_key_pem: Option<&str>,
) where
    T: Serialize,
{
    let entry = match kv.get(kv_key).await {
        Ok(entry) => entry,
        Err(err) => {
            tracing::warn!(kv_key, error = %err, "placeholder repair: failed to read current value, skipping");
            return;
        }
    };

    if !entry.found {
        return;
    }

    let stored: serde_json::Value = match serde_json::from_slice(&entry.value) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(kv_key, error = %err, "placeholder repair: stored value is not valid JSON, skipping");
            return;
        }
    };

    if !needs_repair(critical_fields, &stored) {
        return;
    }

    let sanitized = match sanitize_json(live_cfg, &rules.json_sensitive_paths, live_jwt_private_key_pem) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(kv_key, error = %err, "placeholder repair: failed to sanitize live config, skipping");
            return;
        }
    };

    if sanitized == entry.value {
        return;
    }

    if let Err(err) = kv.put(kv_key, sanitized, 0).await {
        tracing::warn!(kv_key, error = %err, "placeholder repair: failed to write repaired config");
    } else {
        tracing::info!(kv_key, "repaired placeholder config in KV");
    }
}
