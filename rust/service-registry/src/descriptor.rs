//! Static service descriptor shape (spec §3 `ServiceDescriptor`).

/// Identity dimension along which a descriptor's key template varies.
///
/// `Poller` is kept as a distinct variant but resolves identically to
/// `Agent` for key-template purposes — see DESIGN.md's Open Question (b):
/// the source material treats "agent" and "poller" scopes as
/// interchangeable identity axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Agent,
    Gateway,
    Poller,
}

impl Scope {
    /// Whether this scope requires an `agent_id` to resolve a templated key.
    pub fn requires_agent_id(&self) -> bool {
        matches!(self, Scope::Agent | Scope::Poller)
    }

    pub fn requires_gateway_id(&self) -> bool {
        matches!(self, Scope::Gateway)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn ext(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        }
    }
}

/// Either a fixed KV key or a template containing `{{agent_id}}` /
/// `{{gateway_id}}` variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    Fixed(&'static str),
    Templated(&'static str),
}

/// Static metadata describing one service's configuration. Immutable at
/// runtime (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub service_type: &'static str,
    pub scope: Scope,
    pub key: KeyShape,
    pub format: ConfigFormat,
    pub critical_fields: &'static [&'static str],
}

impl ServiceDescriptor {
    /// `templates/<name>.<ext>`, the KV-visible default-template key.
    pub fn template_storage_key(&self) -> String {
        format!("templates/{}.{}", self.name, self.format.ext())
    }
}

/// Identity tuple supplied when resolving a scoped descriptor.
#[derive(Debug, Clone, Default)]
pub struct KeyContext {
    pub agent_id: Option<String>,
    pub gateway_id: Option<String>,
}

impl KeyContext {
    pub fn with_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            gateway_id: None,
        }
    }

    pub fn with_gateway(gateway_id: impl Into<String>) -> Self {
        Self {
            agent_id: None,
            gateway_id: Some(gateway_id.into()),
        }
    }
}
