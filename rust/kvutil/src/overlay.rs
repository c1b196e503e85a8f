//! JSON merge-overlay primitives shared by the config loader (spec C6).

use crate::{KvError, Result};
use serde::{Deserialize, Serialize};

/// Deep-merge a JSON overlay into a `Serialize`/`Deserialize` config object.
pub fn overlay_json<T>(dst: &mut T, overlay: &[u8]) -> Result<()>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let base_bytes = serde_json::to_vec(dst).map_err(|e| KvError::Other(e.into()))?;
    let mut base: serde_json::Value =
        serde_json::from_slice(&base_bytes).map_err(|e| KvError::Other(e.into()))?;
    let over: serde_json::Value =
        serde_json::from_slice(overlay).map_err(|e| KvError::Other(e.into()))?;
    merge_values(&mut base, &over);
    *dst = serde_json::from_value(base).map_err(|e| KvError::Other(e.into()))?;
    Ok(())
}

pub(crate) fn merge_values(dst: &mut serde_json::Value, src: &serde_json::Value) {
    match (dst, src) {
        (serde_json::Value::Object(d), serde_json::Value::Object(s)) => {
            for (k, v) in s {
                match d.get_mut(k) {
                    Some(dv) => merge_values(dv, v),
                    None => {
                        d.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, s) => {
            *d = s.clone();
        }
    }
}

/// Overlay TOML onto an existing config by converting to JSON values and
/// deep-merging.
pub fn overlay_toml<T>(dst: &mut T, overlay: &[u8]) -> Result<()>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    // Parse overlay TOML into T first to ensure schema alignment.
    let overlay_str = std::str::from_utf8(overlay).map_err(|e| KvError::Other(e.into()))?;
    let overlay_cfg: T = toml::from_str(overlay_str).map_err(|e| KvError::Other(e.into()))?;
    let base_json = serde_json::to_value(&mut *dst).map_err(|e| KvError::Other(e.into()))?;
    let mut overlay_json_val =
        serde_json::to_value(&overlay_cfg).map_err(|e| KvError::Other(e.into()))?;
    prune_nulls(&mut overlay_json_val);
    let mut merged = base_json;
    merge_values(&mut merged, &overlay_json_val);
    *dst = serde_json::from_value(merged).map_err(|e| KvError::Other(e.into()))?;
    Ok(())
}

fn prune_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let null_keys: Vec<String> = map
                .iter_mut()
                .filter_map(|(k, v)| {
                    prune_nulls(v);
                    if v.is_null() {
                        Some(k.clone())
                    } else {
                        None
                    }
                })
                .collect();
            for k in null_keys {
                map.remove(&k);
            }
        }
        serde_json::Value::Array(arr) => {
            for v in arr {
                prune_nulls(v);
            }
        }
        _ => {}
    }
}
