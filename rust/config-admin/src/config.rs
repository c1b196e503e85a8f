//! Admin binary configuration, mirroring `srql::config::AppConfig`'s
//! envy-based `from_env` (spec SPEC_FULL §3 ambient stack).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub default_kv_store_id: String,
    pub instance_id: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// store id -> domain name, for `qualify_kv_key` (spec §4.3).
    pub domains: HashMap<String, String>,
    pub snapshot_publish_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    admin_listen_addr: Option<String>,
    #[serde(default)]
    admin_listen_host: Option<String>,
    #[serde(default)]
    admin_listen_port: Option<u16>,
    #[serde(default = "default_store_id")]
    admin_default_kv_store: String,
    #[serde(default)]
    admin_instance_id: Option<String>,
    #[serde(default)]
    admin_api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    admin_request_timeout_secs: u64,
    #[serde(default)]
    admin_kv_domains: Option<String>,
    #[serde(default = "default_snapshot_interval_secs")]
    admin_snapshot_interval_secs: u64,
}

fn default_store_id() -> String {
    "default".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_snapshot_interval_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse ADMIN_* environment variables")?;

        let listen_addr = resolve_addr(
            raw.admin_listen_addr,
            raw.admin_listen_host,
            raw.admin_listen_port,
        )?;

        let domains = raw
            .admin_kv_domains
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("ADMIN_KV_DOMAINS must be a JSON object of store id -> domain")?
            .unwrap_or_default();

        Ok(Self {
            listen_addr,
            default_kv_store_id: raw.admin_default_kv_store,
            instance_id: raw.admin_instance_id.unwrap_or_else(|| {
                std::env::var("HOSTNAME").unwrap_or_else(|_| "config-admin".to_string())
            }),
            api_key: raw.admin_api_key,
            request_timeout: Duration::from_secs(raw.admin_request_timeout_secs.max(1)),
            domains,
            snapshot_publish_interval: Duration::from_secs(raw.admin_snapshot_interval_secs.max(1)),
        })
    }

    pub fn embedded() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".parse().expect("valid socket addr"),
            default_kv_store_id: default_store_id(),
            instance_id: "config-admin".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(default_timeout_secs()),
            domains: HashMap::new(),
            snapshot_publish_interval: Duration::from_secs(default_snapshot_interval_secs()),
        }
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid ADMIN_LISTEN_ADDR value")?
            .next()
            .context("ADMIN_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8580);
    let combined = format!("{host}:{port}");
    combined
        .to_socket_addrs()
        .context("invalid admin listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
