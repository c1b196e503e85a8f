//! Key resolution and domain qualification (spec §4.3 Key Resolver).

use crate::descriptor::{KeyContext, KeyShape, ServiceDescriptor};
use crate::error::{RegistryError, Result};
use std::collections::HashMap;

/// Explicit KV key prefixes recognized by the fallback path→key
/// derivation (spec §4.3's last sentence).
const EXPLICIT_PREFIXES: &[&str] = &[
    "config/",
    "agents/",
    "pollers/",
    "watchers/",
    "templates/",
    "domains/",
];

/// Resolve a descriptor (+ optional identity context) to a concrete KV key.
pub fn resolve_kv_key(desc: &ServiceDescriptor, ctx: &KeyContext) -> Result<String> {
    let key = match desc.key {
        KeyShape::Fixed(key) => key.to_string(),
        KeyShape::Templated(template) => {
            let mut key = template.to_string();
            if desc.scope.requires_agent_id() {
                let agent_id = ctx
                    .agent_id
                    .as_deref()
                    .ok_or(RegistryError::MissingIdentity { field: "agent_id" })?;
                key = key.replace("{{agent_id}}", agent_id);
            }
            if desc.scope.requires_gateway_id() {
                let gateway_id = ctx
                    .gateway_id
                    .as_deref()
                    .ok_or(RegistryError::MissingIdentity {
                        field: "gateway_id",
                    })?;
                key = key.replace("{{gateway_id}}", gateway_id);
            }
            key
        }
    };

    if key.contains("{{") {
        return Err(RegistryError::UnresolvedPlaceholder { key });
    }

    Ok(key)
}

/// Idempotently prefix a key with `domains/<domain>/` when `store_id` maps
/// to a named domain; keys already beginning with `domains/` are returned
/// unchanged (spec §4.3).
pub fn qualify_kv_key(domains: &HashMap<String, String>, store_id: Option<&str>, key: &str) -> String {
    if key.starts_with("domains/") {
        return key.to_string();
    }

    let Some(store_id) = store_id else {
        return key.to_string();
    };

    match domains.get(store_id) {
        Some(domain) => format!("domains/{domain}/{key}"),
        None => key.to_string(),
    }
}

/// Fallback "path → config/basename" derivation, used only when no
/// descriptor matches and the incoming path is not an explicit KV prefix.
pub fn fallback_key_for_path(path: &str) -> String {
    if EXPLICIT_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return path.to_string();
    }

    let basename = path.rsplit('/').next().unwrap_or(path);
    format!("config/{basename}")
}
