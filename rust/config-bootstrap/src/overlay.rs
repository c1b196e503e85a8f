//! Config Loader / Overlay (spec C6): wraps `kvutil`'s deep-merge overlay
//! with the security-normalization hook spec §4.6 requires.
//!
//! After a merge, if a `security.tls` block exists and its certificate/key
//! /CA file paths are bare filenames, they're prepended with
//! `security.cert_dir`; an empty `client_ca_file` defaults to the
//! normalized `ca_file`.

use crate::{BootstrapError, ConfigFormat, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

const TLS_PATH_FIELDS: &[&str] = &["cert_file", "key_file", "ca_file"];

/// Apply `bytes` as a structural merge onto `dst` per `format`, then run
/// the TLS path normalization pass.
pub fn overlay_bytes<T>(dst: &mut T, bytes: &[u8], format: ConfigFormat) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    match format {
        ConfigFormat::Json => kvutil::overlay_json(dst, bytes)?,
        ConfigFormat::Toml => kvutil::overlay_toml(dst, bytes)?,
    }
    normalize_tls_paths(dst)?;
    Ok(())
}

fn normalize_tls_paths<T>(dst: &mut T) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(&*dst).map_err(BootstrapError::JsonParse)?;

    let cert_dir = value
        .pointer("/security/cert_dir")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    if let Some(cert_dir) = cert_dir {
        if let Some(tls) = value
            .pointer_mut("/security/tls")
            .and_then(|v| v.as_object_mut())
        {
            for field in TLS_PATH_FIELDS {
                if let Some(normalized) = normalized_path(tls.get(*field), &cert_dir) {
                    tls.insert((*field).to_string(), serde_json::Value::String(normalized));
                }
            }

            let ca_file = tls.get("ca_file").and_then(|v| v.as_str()).map(str::to_string);
            let client_ca_is_empty = tls
                .get("client_ca_file")
                .and_then(|v| v.as_str())
                .map(str::is_empty)
                .unwrap_or(true);

            if client_ca_is_empty {
                if let Some(ca_file) = ca_file {
                    tls.insert(
                        "client_ca_file".to_string(),
                        serde_json::Value::String(ca_file),
                    );
                }
            }
        }
    }

    *dst = serde_json::from_value(value).map_err(BootstrapError::JsonParse)?;
    Ok(())
}

/// Returns `Some(cert_dir/basename)` when `field` is a non-empty string
/// that looks like a bare filename (no path separators); `None` when the
/// field is absent, empty, or already an absolute/relative path.
fn normalized_path(field: Option<&serde_json::Value>, cert_dir: &str) -> Option<String> {
    let s = field?.as_str()?;
    if s.is_empty() || s.contains('/') {
        return None;
    }
    Some(format!("{}/{}", cert_dir.trim_end_matches('/'), s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Tls {
        #[serde(default)]
        cert_file: String,
        #[serde(default)]
        key_file: String,
        #[serde(default)]
        ca_file: String,
        #[serde(default)]
        client_ca_file: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Security {
        cert_dir: String,
        tls: Tls,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Cfg {
        security: Security,
    }

    #[test]
    fn normalizes_bare_filenames_and_mirrors_client_ca() {
        let mut cfg = Cfg {
            security: Security {
                cert_dir: "/etc/serviceradar/certs".to_string(),
                tls: Tls::default(),
            },
        };

        let overlay = br#"{"security":{"tls":{"cert_file":"kv.pem","key_file":"kv-key.pem","ca_file":"kv-root.pem","client_ca_file":""}}}"#;
        overlay_bytes(&mut cfg, overlay, ConfigFormat::Json).unwrap();

        assert_eq!(cfg.security.tls.cert_file, "/etc/serviceradar/certs/kv.pem");
        assert_eq!(cfg.security.tls.key_file, "/etc/serviceradar/certs/kv-key.pem");
        assert_eq!(cfg.security.tls.ca_file, "/etc/serviceradar/certs/kv-root.pem");
        assert_eq!(cfg.security.tls.client_ca_file, "/etc/serviceradar/certs/kv-root.pem");
    }

    #[test]
    fn leaves_already_qualified_paths_untouched() {
        let mut cfg = Cfg {
            security: Security {
                cert_dir: "/etc/serviceradar/certs".to_string(),
                tls: Tls {
                    cert_file: "/opt/certs/existing.pem".to_string(),
                    ..Tls::default()
                },
            },
        };

        let overlay = br#"{"security":{"tls":{"key_file":"kv-key.pem"}}}"#;
        overlay_bytes(&mut cfg, overlay, ConfigFormat::Json).unwrap();

        assert_eq!(cfg.security.tls.cert_file, "/opt/certs/existing.pem");
        assert_eq!(cfg.security.tls.key_file, "/etc/serviceradar/certs/kv-key.pem");
    }

    #[test]
    fn overlay_is_idempotent() {
        let mut cfg = Cfg {
            security: Security {
                cert_dir: "/etc/serviceradar/certs".to_string(),
                tls: Tls::default(),
            },
        };
        let overlay = br#"{"security":{"tls":{"cert_file":"kv.pem","ca_file":"kv-root.pem"}}}"#;
        overlay_bytes(&mut cfg, overlay, ConfigFormat::Json).unwrap();
        let once = serde_json::to_value(&cfg).unwrap();
        overlay_bytes(&mut cfg, overlay, ConfigFormat::Json).unwrap();
        let twice = serde_json::to_value(&cfg).unwrap();
        assert_eq!(once, twice);
    }
}
