//! Configuration bootstrap library for ServiceRadar Rust services.
//!
//! Implements the Config Loader / Overlay (C6) and Placeholder Repairer
//! (C7) components of the control plane on top of `kvutil`'s polymorphic
//! `KvStore` capability (C1) and `service-registry`'s descriptor catalog
//! (C2/C3):
//!
//! 1. Load config from disk (JSON or TOML)
//! 2. Overlay KV values (if present), applying the TLS security
//!    normalization hook
//! 3. Seed sanitized defaults to KV (when missing)
//! 4. Repair placeholder-valued critical fields in stored KV content
//! 5. Watch for KV changes and trigger reload hooks
//!
//! # Example
//!
//! ```rust,no_run
//! use config_bootstrap::{Bootstrap, BootstrapOptions, ConfigFormat};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct MyConfig {
//!     listen_addr: String,
//!     log_level: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let opts = BootstrapOptions {
//!         service_name: "my-service".to_string(),
//!         config_path: "/etc/serviceradar/my-service.toml".to_string(),
//!         format: ConfigFormat::Toml,
//!         kv_key: Some("config/my-service.toml".to_string()),
//!         seed_kv: true,
//!         watch_kv: false,
//!     };
//!
//!     let mut bootstrap = Bootstrap::new(opts).await?;
//!     let config: MyConfig = bootstrap.load().await?;
//!
//!     println!("Loaded config: {:?}", config);
//!     Ok(())
//! }
//! ```

mod overlay;
mod repair;
mod sanitize;
mod template;
mod watch;

pub use overlay::overlay_bytes;
pub use repair::repair_config_placeholders;
pub use sanitize::{
    is_placeholder, load_sanitization_rules, needs_repair, sanitize_json, sanitize_toml,
    SanitizationRules, SanitizeError, TomlPath,
};
pub use template::{parse_format, TemplateAsset, TemplateError, TemplateRegistry};
pub use watch::ConfigWatcher;

use kvutil::{KvClient, KvError, KvStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("KV error: {0}")]
    Kv(#[from] KvError),

    #[error("config format mismatch: expected {expected}, got {actual}")]
    FormatMismatch { expected: String, actual: String },

    #[error("missing config: no file at {path} and no KV data")]
    MissingConfig { path: String },

    #[error("sanitization rules not loaded")]
    SanitizationRulesNotLoaded,
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        }
    }
}

/// Options for bootstrapping a service configuration.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Service name (e.g., "flowgger", "trapd")
    pub service_name: String,

    /// Path to the on-disk config file
    pub config_path: String,

    /// Config format (JSON or TOML)
    pub format: ConfigFormat,

    /// Optional KV key (if None, KV is not used)
    pub kv_key: Option<String>,

    /// Whether to seed sanitized config to KV when missing
    pub seed_kv: bool,

    /// Whether to watch KV for changes
    pub watch_kv: bool,
}

/// Main bootstrap coordinator.
pub struct Bootstrap {
    opts: BootstrapOptions,
    kv: Option<Arc<dyn KvStore>>,
    sanitization_rules: Option<SanitizationRules>,
}

impl Bootstrap {
    /// Create a new Bootstrap instance.
    ///
    /// If KV_ADDRESS is set, this will attempt to connect to the KV service.
    /// Connection failures are logged but not fatal (service can run from disk config only).
    pub async fn new(opts: BootstrapOptions) -> Result<Self> {
        let kv: Option<Arc<dyn KvStore>> = if opts.kv_key.is_some() {
            match KvClient::connect_from_env().await {
                Ok(client) => {
                    tracing::info!(service = %opts.service_name, "connected to KV service");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::warn!(
                        service = %opts.service_name,
                        error = %e,
                        "failed to connect to KV; running with disk config only"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::with_kv_store(opts, kv))
    }

    /// Build a Bootstrap against an already-constructed KV capability —
    /// the embedded or mock-for-tests variants spec §9 requires alongside
    /// the remote gRPC client.
    pub fn with_kv_store(opts: BootstrapOptions, kv: Option<Arc<dyn KvStore>>) -> Self {
        let sanitization_rules = if opts.seed_kv {
            match load_sanitization_rules() {
                Ok(rules) => Some(rules),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "failed to load sanitization rules; KV seeding will use raw config"
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            opts,
            kv,
            sanitization_rules,
        }
    }

    /// Load config following the bootstrap lifecycle:
    /// 1. Load from disk
    /// 2. Overlay KV (if present), including the TLS security-normalization
    ///    pass
    /// 3. Seed to KV (if missing and seed_kv is true)
    /// 4. Repair placeholder-valued critical fields in stored KV content
    pub async fn load<T>(&mut self) -> Result<T>
    where
        T: Serialize + for<'de> Deserialize<'de>,
    {
        let mut config = self.load_from_disk::<T>().await?;

        let should_seed = if let Some(ref kv) = self.kv {
            if let Some(ref kv_key) = self.opts.kv_key {
                match kv.get(kv_key).await {
                    Ok(entry) if entry.found => {
                        tracing::info!(
                            service = %self.opts.service_name,
                            kv_key = %kv_key,
                            "overlaying KV config"
                        );
                        overlay::overlay_bytes(&mut config, &entry.value, self.opts.format)?;
                        false
                    }
                    Ok(_) => self.opts.seed_kv,
                    Err(e) => {
                        tracing::warn!(
                            service = %self.opts.service_name,
                            kv_key = %kv_key,
                            error = %e,
                            "failed to fetch from KV; using disk config"
                        );
                        false
                    }
                }
            } else {
                false
            }
        } else {
            false
        };

        if should_seed {
            let sanitized = self.sanitize_config(&config)?;
            if let Some(ref kv) = self.kv {
                if let Some(ref kv_key) = self.opts.kv_key {
                    match kv.put(kv_key, sanitized, 0).await {
                        Ok(_) => {
                            tracing::info!(
                                service = %self.opts.service_name,
                                kv_key = %kv_key,
                                "seeded sanitized config to KV"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                service = %self.opts.service_name,
                                error = %e,
                                "failed to seed config to KV"
                            );
                        }
                    }
                }
            }
        }

        Ok(config)
    }

    /// Runs the C7 placeholder repairer against the currently stored KV
    /// value for this bootstrap's key, using `live_cfg` as the sanitized
    /// replacement source. A no-op if KV is unconfigured or the stored
    /// value has no placeholder-valued critical field.
    pub async fn repair_placeholders<T>(&self, critical_fields: &[&str], live_cfg: &T)
    where
        T: Serialize,
    {
        let (Some(kv), Some(kv_key)) = (&self.kv, &self.opts.kv_key) else {
            return;
        };
        let rules = self
            .sanitization_rules
            .clone()
            .unwrap_or_else(sanitize::default_sanitization_rules);
        repair::repair_config_placeholders(kv.as_ref(), kv_key, critical_fields, live_cfg, &rules, None).await;
    }

    /// Start watching KV for changes. Returns a ConfigWatcher that the service can poll.
    pub async fn watch<T>(&mut self) -> Result<Option<ConfigWatcher<T>>>
    where
        T: Serialize + for<'de> Deserialize<'de> + Send + 'static,
    {
        if !self.opts.watch_kv {
            return Ok(None);
        }

        let Some(ref kv) = self.kv else {
            tracing::warn!(
                service = %self.opts.service_name,
                "watch requested but no KV client available"
            );
            return Ok(None);
        };

        let Some(ref kv_key) = self.opts.kv_key else {
            return Ok(None);
        };

        ConfigWatcher::new(
            kv.clone(),
            kv_key.clone(),
            self.opts.format,
            self.opts.service_name.clone(),
        )
        .await
        .map(Some)
    }

    async fn load_from_disk<T>(&self) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let path = Path::new(&self.opts.config_path);

        if !path.exists() {
            return Err(BootstrapError::MissingConfig {
                path: self.opts.config_path.clone(),
            });
        }

        let data = tokio::fs::read(path).await?;

        match self.opts.format {
            ConfigFormat::Json => {
                let config: T = serde_json::from_slice(&data)?;
                Ok(config)
            }
            ConfigFormat::Toml => {
                let s = std::str::from_utf8(&data)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                let config: T = toml::from_str(s)?;
                Ok(config)
            }
        }
    }

    fn sanitize_config<T>(&self, config: &T) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        match self.opts.format {
            ConfigFormat::Json => {
                let rules = self
                    .sanitization_rules
                    .as_ref()
                    .map(|r| r.json_sensitive_paths.clone())
                    .unwrap_or_default();
                Ok(sanitize_json(config, &rules, None)?)
            }
            ConfigFormat::Toml => {
                let toml_str = toml::to_string(config)?;

                if let Some(ref rules) = self.sanitization_rules {
                    let sanitized = sanitize_toml(toml_str.as_bytes(), &rules.toml_deny_list);
                    Ok(sanitized)
                } else {
                    tracing::warn!(
                        service = %self.opts.service_name,
                        "sanitizing TOML without rules; sensitive data may leak to KV"
                    );
                    Ok(toml_str.into_bytes())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestConfig {
        listen_addr: String,
        log_level: String,
        #[serde(default)]
        token: String,
    }

    #[tokio::test]
    async fn test_load_from_disk_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"listen_addr": "0.0.0.0:8080", "log_level": "info"}}"#
        )
        .unwrap();

        let opts = BootstrapOptions {
            service_name: "test".to_string(),
            config_path: file.path().to_str().unwrap().to_string(),
            format: ConfigFormat::Json,
            kv_key: None,
            seed_kv: false,
            watch_kv: false,
        };

        let mut bootstrap = Bootstrap::new(opts).await.unwrap();
        let config: TestConfig = bootstrap.load().await.unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.log_level, "info");
    }

    #[tokio::test]
    async fn test_load_from_disk_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
listen_addr = "0.0.0.0:9090"
log_level = "debug"
"#
        )
        .unwrap();

        let opts = BootstrapOptions {
            service_name: "test".to_string(),
            config_path: file.path().to_str().unwrap().to_string(),
            format: ConfigFormat::Toml,
            kv_key: None,
            seed_kv: false,
            watch_kv: false,
        };

        let mut bootstrap = Bootstrap::new(opts).await.unwrap();
        let config: TestConfig = bootstrap.load().await.unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9090");
        assert_eq!(config.log_level, "debug");
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let opts = BootstrapOptions {
            service_name: "test".to_string(),
            config_path: "/nonexistent/path.json".to_string(),
            format: ConfigFormat::Json,
            kv_key: None,
            seed_kv: false,
            watch_kv: false,
        };

        let mut bootstrap = Bootstrap::new(opts).await.unwrap();
        let result: Result<TestConfig> = bootstrap.load().await;

        assert!(matches!(result, Err(BootstrapError::MissingConfig { .. })));
    }

    #[tokio::test]
    async fn test_seed_on_missing_kv_uses_in_process_store() {
        use kvutil::InProcessKv;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"listen_addr": "0.0.0.0:8080", "log_level": "info"}}"#).unwrap();

        let opts = BootstrapOptions {
            service_name: "test".to_string(),
            config_path: file.path().to_str().unwrap().to_string(),
            format: ConfigFormat::Json,
            kv_key: Some("config/test.json".to_string()),
            seed_kv: true,
            watch_kv: false,
        };

        let kv: Arc<dyn KvStore> = Arc::new(InProcessKv::new());
        let mut bootstrap = Bootstrap::with_kv_store(opts, Some(kv.clone()));
        let _config: TestConfig = bootstrap.load().await.unwrap();

        let entry = kv.get("config/test.json").await.unwrap();
        assert!(entry.found);
    }

    #[tokio::test]
    async fn test_existing_kv_value_overlays_disk_config() {
        use kvutil::InProcessKv;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"listen_addr": "0.0.0.0:8080", "log_level": "info"}}"#).unwrap();

        let kv = InProcessKv::new();
        kv.put("config/test.json", br#"{"log_level":"debug"}"#.to_vec(), 0)
            .await
            .unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(kv);

        let opts = BootstrapOptions {
            service_name: "test".to_string(),
            config_path: file.path().to_str().unwrap().to_string(),
            format: ConfigFormat::Json,
            kv_key: Some("config/test.json".to_string()),
            seed_kv: true,
            watch_kv: false,
        };

        let mut bootstrap = Bootstrap::with_kv_store(opts, Some(kv));
        let config: TestConfig = bootstrap.load().await.unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.log_level, "debug");
    }
}
