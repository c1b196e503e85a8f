//! Admin-boundary redaction (spec §3/§4.10/§6): distinct from the C4
//! sanitizer's field-removal semantics. Read path replaces sensitive
//! string leaves with the sentinel; write path restores the sentinel
//! from the previously stored document, matching list entries by a
//! natural key (`name` for jobs, `name`/`base_url` for unifi
//! integrations) and falling back to index for keyless lists.

use serde_json::Value;

/// The sole redaction marker (spec §6). Must round-trip unchanged
/// through the update path.
pub const REDACTED_SENTINEL: &str = "__SR_REDACTED__";

const LIST_MATCH_KEYS: &[&str] = &["name", "base_url"];

/// Recursively replaces every string-valued field whose name appears in
/// `sensitive_field_names` with the sentinel, wherever it occurs in the
/// document — including inside list items (spec §4.10's per-service
/// redaction, which applies to arbitrarily nested `jobs`/integration
/// entries rather than a fixed dotted path).
pub fn redact_sensitive_fields(value: &mut Value, sensitive_field_names: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if sensitive_field_names.iter().any(|n| n == key) && field.is_string() {
                    *field = Value::String(REDACTED_SENTINEL.to_string());
                } else {
                    redact_sensitive_fields(field, sensitive_field_names);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_sensitive_fields(item, sensitive_field_names);
            }
        }
        _ => {}
    }
}

/// Reverses sentinel substitution in `incoming` using `previous` as the
/// source of truth, walking both documents in parallel (spec §4.10's
/// redaction round-trip).
pub fn restore_redacted(previous: &Value, incoming: &mut Value) {
    match (previous, incoming) {
        (Value::Object(prev), Value::Object(cur)) => {
            for (key, cur_value) in cur.iter_mut() {
                if let Some(prev_value) = prev.get(key) {
                    restore_redacted(prev_value, cur_value);
                }
            }
        }
        (Value::Array(prev), Value::Array(cur)) => {
            for (index, cur_item) in cur.iter_mut().enumerate() {
                if let Some(prev_item) = match_list_item(prev, cur_item, index) {
                    restore_redacted(prev_item, cur_item);
                }
            }
        }
        (prev_leaf, cur_leaf) => {
            if cur_leaf.as_str() == Some(REDACTED_SENTINEL) {
                *cur_leaf = prev_leaf.clone();
            }
        }
    }
}

/// Matches a previous-document list element to `cur_item` by a natural
/// key (`name`, then `base_url`); falls back to positional index when
/// the item carries neither, or the document has no matching list.
fn match_list_item<'a>(prev_list: &'a [Value], cur_item: &Value, index: usize) -> Option<&'a Value> {
    if let Value::Object(cur_obj) = cur_item {
        for key_field in LIST_MATCH_KEYS {
            if let Some(key_value) = cur_obj.get(*key_field) {
                if let Some(found) = prev_list.iter().find(|candidate| {
                    candidate.get(*key_field) == Some(key_value)
                }) {
                    return Some(found);
                }
            }
        }
    }
    prev_list.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redact_replaces_sensitive_leaf_with_sentinel() {
        let mut value = json!({"default_credentials": {"community": "public"}});
        redact_sensitive_fields(&mut value, &["community".to_string()]);
        assert_eq!(value["default_credentials"]["community"], REDACTED_SENTINEL);
    }

    #[test]
    fn redact_reaches_into_list_items() {
        let mut value = json!({"jobs": [{"name": "ping", "token": "secret"}]});
        redact_sensitive_fields(&mut value, &["token".to_string()]);
        assert_eq!(value["jobs"][0]["token"], REDACTED_SENTINEL);
    }

    #[test]
    fn restore_reverses_sentinel_for_scalar_field() {
        let previous = json!({"default_credentials": {"community": "public"}, "workers": 3});
        let mut incoming = json!({"default_credentials": {"community": REDACTED_SENTINEL}, "workers": 7});

        restore_redacted(&previous, &mut incoming);

        assert_eq!(incoming["default_credentials"]["community"], "public");
        assert_eq!(incoming["workers"], 7);
    }

    #[test]
    fn restore_matches_job_lists_by_name() {
        let previous = json!({
            "jobs": [
                {"name": "ping", "token": "secret-ping"},
                {"name": "trace", "token": "secret-trace"},
            ]
        });
        let mut incoming = json!({
            "jobs": [
                {"name": "trace", "token": REDACTED_SENTINEL},
                {"name": "ping", "token": REDACTED_SENTINEL},
            ]
        });

        restore_redacted(&previous, &mut incoming);

        assert_eq!(incoming["jobs"][0]["token"], "secret-trace");
        assert_eq!(incoming["jobs"][1]["token"], "secret-ping");
    }

    #[test]
    fn restore_matches_unifi_lists_by_base_url() {
        let previous = json!({
            "integrations": [
                {"base_url": "https://unifi.local", "api_key": "unifi-key"},
            ]
        });
        let mut incoming = json!({
            "integrations": [
                {"base_url": "https://unifi.local", "api_key": REDACTED_SENTINEL},
            ]
        });

        restore_redacted(&previous, &mut incoming);

        assert_eq!(incoming["integrations"][0]["api_key"], "unifi-key");
    }

    #[test]
    fn restore_falls_back_to_index_without_a_natural_key() {
        let previous = json!({"items": [{"value": "a"}, {"value": REDACTED_SENTINEL}]});
        let mut incoming = json!({"items": [{"value": REDACTED_SENTINEL}, {"value": "b"}]});

        restore_redacted(&previous, &mut incoming);

        assert_eq!(incoming["items"][0]["value"], "a");
        assert_eq!(incoming["items"][1]["value"], "b");
    }
}
