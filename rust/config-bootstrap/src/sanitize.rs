//! Sanitization (spec C4): TOML line-based denylist filtering, JSON
//! sensitive-field removal, JWT public-key derivation, and placeholder
//! detection.
//!
//! The TOML filtering mirrors Go's `pkg/config/toml_mask.go`.

use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePublicKey};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SanitizeError {
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to derive JWT public key: {0}")]
    Jwt(String),
}

pub type Result<T> = std::result::Result<T, SanitizeError>;

/// Identifies a specific key inside an optional table (e.g.
/// table="outputs.prometheus", key="token"). `table="*"` matches keys in
/// any table; `key="*"` drops every key under the given table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TomlPath {
    pub table: String,
    pub key: String,
}

/// Container for sanitization rules loaded from
/// `config/sanitization-rules.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizationRules {
    #[serde(default)]
    pub description: String,
    pub toml_deny_list: Vec<TomlPath>,
    #[serde(default)]
    pub json_sensitive_paths: Vec<String>,
}

/// Load sanitization rules from the filesystem, falling back to a
/// built-in default deny list if no file is found.
pub fn load_sanitization_rules() -> std::result::Result<SanitizationRules, Box<dyn std::error::Error>> {
    let paths = [
        "/etc/serviceradar/sanitization-rules.json",
        "config/sanitization-rules.json",
        "../config/sanitization-rules.json",
        "../../config/sanitization-rules.json",
    ];

    for path in &paths {
        if let Ok(data) = std::fs::read(path) {
            if let Ok(rules) = serde_json::from_slice::<SanitizationRules>(&data) {
                tracing::debug!(path = %path, "loaded sanitization rules");
                return Ok(rules);
            }
        }
    }

    tracing::warn!("sanitization rules not found; using default deny list");
    Ok(default_sanitization_rules())
}

pub(crate) fn default_sanitization_rules() -> SanitizationRules {
    SanitizationRules {
        description: "Default sanitization rules".to_string(),
        toml_deny_list: vec![
            TomlPath { table: "*".to_string(), key: "token".to_string() },
            TomlPath { table: "*".to_string(), key: "secret".to_string() },
            TomlPath { table: "*".to_string(), key: "password".to_string() },
            TomlPath { table: "*".to_string(), key: "api_key".to_string() },
            TomlPath { table: "*".to_string(), key: "apiKey".to_string() },
        ],
        json_sensitive_paths: vec![
            "jwt_private_key_pem".to_string(),
            "security.tls.key_file".to_string(),
            "password".to_string(),
            "api_key".to_string(),
        ],
    }
}

// --- TOML sanitization -----------------------------------------------

/// Sanitize TOML by removing lines whose (table, key) match the deny list.
pub fn sanitize_toml(data: &[u8], deny_list: &[TomlPath]) -> Vec<u8> {
    if data.is_empty() || deny_list.is_empty() {
        return data.to_vec();
    }

    let deny_map = build_deny_map(deny_list);

    let mut output = Vec::new();
    let mut current_table = String::new();

    let reader = std::io::Cursor::new(data);
    for line in reader.lines() {
        let Ok(raw_line) = line else {
            continue;
        };

        let trimmed = raw_line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            writeln!(&mut output, "{}", raw_line).ok();
            continue;
        }

        if is_table_header(trimmed) {
            current_table = trimmed.trim_matches(|c| c == '[' || c == ']').to_string();
            writeln!(&mut output, "{}", raw_line).ok();
            continue;
        }

        let key = extract_key(trimmed);
        if key.is_empty() {
            writeln!(&mut output, "{}", raw_line).ok();
            continue;
        }

        if should_drop_key(&current_table, &key, &deny_map) {
            tracing::debug!(table = %current_table, key = %key, "dropping sensitive key");
            continue;
        }

        writeln!(&mut output, "{}", raw_line).ok();
    }

    while output.last() == Some(&b'\n') {
        output.pop();
    }

    output
}

fn build_deny_map(
    deny_list: &[TomlPath],
) -> std::collections::HashMap<String, std::collections::HashSet<String>> {
    let mut map = std::collections::HashMap::new();

    for path in deny_list {
        let table = if path.table.is_empty() { "" } else { &path.table };
        let key = if path.key.is_empty() { "*" } else { &path.key };

        map.entry(table.to_string())
            .or_insert_with(std::collections::HashSet::new)
            .insert(key.to_string());
    }

    map
}

fn should_drop_key(
    table: &str,
    key: &str,
    deny_map: &std::collections::HashMap<String, std::collections::HashSet<String>>,
) -> bool {
    if let Some(keys) = deny_map.get(table) {
        if keys.contains("*") || keys.contains(key) {
            return true;
        }
    }

    if let Some(keys) = deny_map.get("*") {
        if keys.contains("*") || keys.contains(key) {
            return true;
        }
    }

    false
}

fn is_table_header(line: &str) -> bool {
    line.starts_with('[') && line.ends_with(']')
}

/// Extracts the bare key from a `key = value` line, consuming characters
/// up to an unquoted `=`, honoring double-quoted strings with backslash
/// escapes; stops (returning empty) if a `#` begins outside a string
/// before `=` is found.
fn extract_key(line: &str) -> String {
    let mut key = String::new();
    let mut in_string = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if in_string {
            key.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    key.push(escaped);
                }
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                key.push(c);
            }
            '#' => return String::new(),
            '=' => return unquote(key.trim()),
            _ => key.push(c),
        }
    }

    String::new()
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

// --- JSON sanitization -------------------------------------------------

/// Remove every field named by a dotted path from a serialized config,
/// and derive `jwt_public_key_pem` from `jwt_private_key_pem` wherever it
/// appears, before the removal runs (spec §4.4).
pub fn sanitize_json<T: Serialize>(
    config: &T,
    sensitive_paths: &[String],
    live_jwt_private_key_pem: Option<&str>,
) -> Result<Vec<u8>> {
    let mut value = serde_json::to_value(config)?;
    derive_jwt_public_keys(&mut value, live_jwt_private_key_pem);
    for path in sensitive_paths {
        remove_path(&mut value, path);
    }
    Ok(serde_json::to_vec(&value)?)
}

fn derive_jwt_public_keys(value: &mut serde_json::Value, live_fallback: Option<&str>) {
    match value {
        serde_json::Value::Object(map) => {
            let stored_private = map
                .get("jwt_private_key_pem")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            let effective = match &stored_private {
                Some(pem) if !is_placeholder(pem) => Some(pem.clone()),
                _ => live_fallback.map(|s| s.to_string()),
            };

            if let Some(private_pem) = effective {
                if let Ok(public_pem) = public_key_pem_from_private(&private_pem) {
                    map.insert(
                        "jwt_public_key_pem".to_string(),
                        serde_json::Value::String(public_pem),
                    );
                } else {
                    tracing::warn!("failed to derive JWT public key from private key material");
                }
            }

            for v in map.values_mut() {
                derive_jwt_public_keys(v, live_fallback);
            }
        }
        serde_json::Value::Array(arr) => {
            for v in arr.iter_mut() {
                derive_jwt_public_keys(v, live_fallback);
            }
        }
        _ => {}
    }
}

fn public_key_pem_from_private(private_pem: &str) -> std::result::Result<String, SanitizeError> {
    let signing_key = SigningKey::from_pkcs8_pem(private_pem)
        .map_err(|e| SanitizeError::Jwt(e.to_string()))?;
    signing_key
        .verifying_key()
        .to_public_key_pem(Default::default())
        .map_err(|e| SanitizeError::Jwt(e.to_string()))
}

fn remove_path(value: &mut serde_json::Value, path: &str) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else { return };

    let mut current = value;
    for part in parts {
        match current.get_mut(part) {
            Some(next) => current = next,
            None => return,
        }
    }

    if let serde_json::Value::Object(map) = current {
        map.remove(last);
    }
}

// --- Placeholder detection ----------------------------------------------

/// A value is a placeholder if it is empty, or case-insensitively
/// contains `127.0.0.1`, `localhost`, or `placeholder` (spec §4.4).
pub fn is_placeholder(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let lower = value.to_lowercase();
    lower.contains("127.0.0.1") || lower.contains("localhost") || lower.contains("placeholder")
}

/// A descriptor needs repair iff at least one of its critical field paths
/// is absent or placeholder-valued in the stored JSON document.
pub fn needs_repair(critical_fields: &[&str], stored: &serde_json::Value) -> bool {
    critical_fields.iter().any(|path| match field_at_path(stored, path) {
        None => true,
        Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => is_placeholder(s),
        Some(_) => false,
    })
}

fn field_at_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |v, part| v.get(part))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_toml_removes_tokens() {
        let input = b"
listen_addr = \"0.0.0.0:8080\"
token = \"secret123\"
log_level = \"info\"
";

        let deny_list = vec![TomlPath { table: "*".to_string(), key: "token".to_string() }];

        let output = sanitize_toml(input, &deny_list);
        let output_str = String::from_utf8_lossy(&output);

        assert!(output_str.contains("listen_addr"));
        assert!(output_str.contains("log_level"));
        assert!(!output_str.contains("token"));
    }

    #[test]
    fn test_sanitize_toml_table_specific() {
        let input = b"
[general]
name = \"test\"
token = \"keep-this\"

[outputs.prometheus]
url = \"http://localhost:9090\"
token = \"drop-this\"
";

        let deny_list = vec![TomlPath { table: "outputs.prometheus".to_string(), key: "token".to_string() }];

        let output = sanitize_toml(input, &deny_list);
        let output_str = String::from_utf8_lossy(&output);

        assert!(output_str.contains("token = \"keep-this\""));
        assert!(!output_str.contains("token = \"drop-this\""));
        assert!(output_str.contains("url ="));
    }

    #[test]
    fn test_sanitize_toml_preserves_comments() {
        let input = b"
# This is a comment
listen_addr = \"0.0.0.0:8080\"
# Another comment
token = \"secret\"
";

        let deny_list = vec![TomlPath { table: "*".to_string(), key: "token".to_string() }];

        let output = sanitize_toml(input, &deny_list);
        let output_str = String::from_utf8_lossy(&output);

        assert!(output_str.contains("# This is a comment"));
        assert!(output_str.contains("# Another comment"));
        assert!(!output_str.contains("token"));
    }

    #[test]
    fn test_sanitize_toml_wildcard_table() {
        let input = b"
[security]
cert_path = \"/path/to/cert\"
key_path = \"/path/to/key\"

[general]
name = \"test\"
";

        let deny_list = vec![TomlPath { table: "security".to_string(), key: "*".to_string() }];

        let output = sanitize_toml(input, &deny_list);
        let output_str = String::from_utf8_lossy(&output);

        assert!(!output_str.contains("cert_path"));
        assert!(!output_str.contains("key_path"));
        assert!(output_str.contains("name = \"test\""));
        assert!(output_str.contains("[security]"));
    }

    #[test]
    fn test_wildcard_table_matches_multiple_tables() {
        let input = b"
[outputs.s3]
url = \"s3://bucket\"
secret = \"s3-secret\"

[outputs.gcs]
url = \"gcs://bucket\"
secret = \"gcs-secret\"
";
        let deny_list = vec![
            TomlPath { table: "outputs.s3".to_string(), key: "*".to_string() },
            TomlPath { table: "outputs.gcs".to_string(), key: "secret".to_string() },
        ];
        let output = sanitize_toml(input, &deny_list);
        let output_str = String::from_utf8_lossy(&output);
        assert!(!output_str.contains("s3://bucket"));
        assert!(!output_str.contains("secret"));
        assert!(output_str.contains("gcs://bucket"));
    }

    #[test]
    fn test_extract_key_honors_quoted_equals() {
        assert_eq!(extract_key(r#"name = "a=b""#), "name");
        assert_eq!(extract_key(r#""weird.key" = 1"#), "weird.key");
        assert_eq!(extract_key("plain_key = 1 # trailing comment"), "plain_key");
    }

    #[test]
    fn test_default_rules_include_common_secrets() {
        let rules = default_sanitization_rules();
        let deny_list = &rules.toml_deny_list;

        assert!(deny_list.iter().any(|p| p.key == "token"));
        assert!(deny_list.iter().any(|p| p.key == "secret"));
        assert!(deny_list.iter().any(|p| p.key == "password"));
        assert!(deny_list.iter().any(|p| p.key == "api_key"));
    }

    #[test]
    fn test_is_placeholder() {
        assert!(is_placeholder(""));
        assert!(is_placeholder("127.0.0.1:50057"));
        assert!(is_placeholder("LOCALHOST"));
        assert!(is_placeholder("a-PlaceHolder-value"));
        assert!(!is_placeholder("serviceradar-datasvc:50057"));
    }

    #[test]
    fn test_needs_repair_detects_placeholder_critical_field() {
        let stored = serde_json::json!({"kv_address": "127.0.0.1:50057", "agent_id": "default-agent"});
        assert!(needs_repair(&["kv_address"], &stored));
    }

    #[test]
    fn test_needs_repair_false_when_clean() {
        let stored = serde_json::json!({"kv_address": "serviceradar-datasvc:50057"});
        assert!(!needs_repair(&["kv_address"], &stored));
    }

    #[test]
    fn test_needs_repair_true_when_absent() {
        let stored = serde_json::json!({});
        assert!(needs_repair(&["kv_address"], &stored));
    }

    #[test]
    fn test_sanitize_json_drops_sensitive_paths() {
        #[derive(Serialize)]
        struct Cfg {
            listen_addr: String,
            password: String,
        }
        let cfg = Cfg { listen_addr: "0.0.0.0:8080".into(), password: "hunter2".into() };
        let sanitized = sanitize_json(&cfg, &["password".to_string()], None).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&sanitized).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value.get("listen_addr").unwrap(), "0.0.0.0:8080");
    }
}
