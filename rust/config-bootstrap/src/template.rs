//! Template Registry (spec C5): service-registered default documents used
//! to seed missing KV keys.
//!
//! Held under a reader/writer lock per spec §5 ("Template registry uses
//! the same reader/writer discipline" as the watcher registry): concurrent
//! `get`/`list`, exclusive `register`.

use crate::ConfigFormat;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template service name must not be empty")]
    EmptyName,
    #[error("template bytes must not be empty")]
    EmptyBytes,
    #[error("unknown template format: {0}")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

#[derive(Debug, Clone)]
pub struct TemplateAsset {
    pub bytes: Vec<u8>,
    pub format: ConfigFormat,
    pub version: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, TemplateAsset>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a default document for `service_name`. Rejects empty name,
    /// empty bytes, or an unrecognized format string (spec §4.5). Callers
    /// that need "json"/"toml" strings (e.g. an RPC boundary) should parse
    /// into [`ConfigFormat`] before calling this, surfacing `UnknownFormat`
    /// for any other spelling.
    pub fn register(
        &self,
        service_name: &str,
        bytes: Vec<u8>,
        format: ConfigFormat,
        version: Option<String>,
    ) -> Result<()> {
        if service_name.is_empty() {
            return Err(TemplateError::EmptyName);
        }
        if bytes.is_empty() {
            return Err(TemplateError::EmptyBytes);
        }

        self.templates.write().insert(
            service_name.to_string(),
            TemplateAsset {
                bytes,
                format,
                version,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn get(&self, service_name: &str) -> Option<TemplateAsset> {
        self.templates.read().get(service_name).cloned()
    }

    /// All registered templates whose name begins with `prefix`, paired
    /// with their byte size, sorted by name for deterministic listing.
    pub fn list(&self, prefix: &str) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = self
            .templates
            .read()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, asset)| (name.clone(), asset.bytes.len()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Parse the "json"/"toml" strings the admin RPC boundary accepts into a
/// [`ConfigFormat`], per spec §4.5's "unknown format" rejection.
pub fn parse_format(s: &str) -> Result<ConfigFormat> {
    match s {
        "json" => Ok(ConfigFormat::Json),
        "toml" => Ok(ConfigFormat::Toml),
        other => Err(TemplateError::UnknownFormat(other.to_string())),
    }
}
