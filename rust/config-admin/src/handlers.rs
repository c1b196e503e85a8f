//! Admin Surface route handlers (spec C10). Each handler resolves a
//! descriptor via `service-registry`, derives/qualifies its KV key,
//! dispatches through `AppState::resolve_kv`, and returns a structured
//! `{message, status}` error body on any non-success path (never a
//! panic — spec §7).

use crate::error::{Result, ServiceError};
use crate::metadata::{self, Origin};
use crate::redaction::{redact_sensitive_fields, restore_redacted};
use crate::state::{redaction_eligible_fields, AppState};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_registry::{descriptor_by_type, descriptor_for, resolve_kv_key, ConfigFormat, KeyContext, Scope, ServiceDescriptor};
use std::collections::HashMap;

const HEADER_KV_KEY: HeaderName = HeaderName::from_static("x-serviceradar-kv-key");
const HEADER_KV_STORE: HeaderName = HeaderName::from_static("x-serviceradar-kv-store");
const HEADER_KV_REVISION: HeaderName = HeaderName::from_static("x-serviceradar-kv-revision");
const HEADER_CONFIG_ORIGIN: HeaderName = HeaderName::from_static("x-serviceradar-config-origin");
const HEADER_CONFIG_WRITER: HeaderName = HeaderName::from_static("x-serviceradar-config-writer");
const HEADER_CONFIG_UPDATED_AT: HeaderName = HeaderName::from_static("x-serviceradar-config-updated-at");

/// Query parameters shared by get/update config (spec §6).
#[derive(Debug, Default, Deserialize)]
pub struct ConfigQuery {
    pub agent_id: Option<String>,
    pub gateway_id: Option<String>,
    pub service_type: Option<String>,
    #[serde(alias = "kvStore")]
    pub kv_store_id: Option<String>,
    #[serde(default)]
    pub raw: bool,
    pub format: Option<String>,
    pub writer: Option<String>,
}

impl ConfigQuery {
    fn wants_raw(&self) -> bool {
        self.raw || self.format.as_deref() == Some("raw")
    }

    fn key_context(&self) -> KeyContext {
        KeyContext {
            agent_id: self.agent_id.clone(),
            gateway_id: self.gateway_id.clone(),
        }
    }
}

fn resolve_descriptor(service: &str, query: &ConfigQuery) -> Result<&'static ServiceDescriptor> {
    if let Ok(desc) = descriptor_for(service) {
        return Ok(desc);
    }

    let Some(service_type) = &query.service_type else {
        return Err(ServiceError::NotFound(format!("no service descriptor registered for {service}")));
    };

    let scope = if query.gateway_id.is_some() {
        Scope::Gateway
    } else if query.agent_id.is_some() {
        Scope::Agent
    } else {
        Scope::Global
    };

    Ok(descriptor_by_type(service_type, scope)?)
}

fn qualify(state: &AppState, store_id: Option<&str>, key: &str) -> String {
    service_registry::qualify_kv_key(&state.config.domains, store_id, key)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum FormatView {
    Json,
    Toml,
}

impl From<ConfigFormat> for FormatView {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Json => FormatView::Json,
            ConfigFormat::Toml => FormatView::Toml,
        }
    }
}

#[derive(Debug, Serialize)]
struct DescriptorView {
    name: &'static str,
    display_name: &'static str,
    service_type: &'static str,
    scope: &'static str,
    format: FormatView,
    critical_fields: &'static [&'static str],
}

fn scope_str(scope: Scope) -> &'static str {
    match scope {
        Scope::Global => "global",
        Scope::Agent => "agent",
        Scope::Gateway => "gateway",
        Scope::Poller => "poller",
    }
}

/// `GET /api/admin/config/descriptors` — all descriptors in
/// deterministic order (spec §4.10).
pub async fn list_descriptors() -> Json<Vec<DescriptorView>> {
    let views = service_registry::descriptors()
        .iter()
        .map(|d| DescriptorView {
            name: d.name,
            display_name: d.display_name,
            service_type: d.service_type,
            scope: scope_str(d.scope),
            format: d.format.into(),
            critical_fields: d.critical_fields,
        })
        .collect();
    Json(views)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// `GET /api/admin/config/status` — 200 iff every global, fixed-key
/// descriptor is present in the default KV store; 503 on first missing,
/// 502 on probe error (spec §4.10).
pub async fn status_probe(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let kv = state.default_kv();
    for desc in service_registry::descriptors() {
        if desc.scope != Scope::Global {
            continue;
        }
        let service_registry::KeyShape::Fixed(key) = desc.key else {
            continue;
        };
        match kv.get(key).await {
            Ok(entry) if entry.found => continue,
            Ok(_) => return Err(ServiceError::ServiceUnavailable(format!("missing config for {}", desc.name))),
            Err(err) => return Err(ServiceError::KvUnavailable(err.to_string())),
        }
    }
    Ok(Json(StatusResponse { status: "ok" }))
}

#[derive(Debug, Serialize, Clone)]
struct WatcherView {
    service: String,
    instance: String,
    kv_key: String,
    status: String,
    last_event: Option<DateTime<Utc>>,
    last_error: Option<String>,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatcherListQuery {
    pub service: Option<String>,
}

fn watcher_status_str(status: watcher_engine::WatcherStatus) -> &'static str {
    match status {
        watcher_engine::WatcherStatus::Running => "running",
        watcher_engine::WatcherStatus::Stopped => "stopped",
        watcher_engine::WatcherStatus::Error => "error",
    }
}

/// `GET /api/admin/watchers` — union of locally registered watchers and
/// remote snapshots loaded from KV, deduped by
/// `(service, instance, kv_key)` lower-cased, keeping the most recent
/// `last_event` (spec §4.10).
pub async fn list_watchers(
    State(state): State<AppState>,
    Query(query): Query<WatcherListQuery>,
) -> Result<Json<Vec<WatcherView>>> {
    let mut merged: HashMap<(String, String, String), WatcherView> = HashMap::new();

    for info in state.watchers.list() {
        let view = WatcherView {
            service: info.service.clone(),
            instance: info.id.clone(),
            kv_key: info.kv_key.clone(),
            status: watcher_status_str(info.status).to_string(),
            last_event: info.last_event,
            last_error: info.last_error.clone(),
            started_at: info.started_at,
        };
        insert_most_recent(&mut merged, view);
    }

    let kv = state.default_kv();
    let target_services: Vec<&str> = service_registry::descriptors()
        .iter()
        .map(|d| d.name)
        .collect();

    for service in target_services {
        let prefix = format!("watchers/{service}/");
        let keys = match kv.list_keys(&prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(service, error = %err, "failed to list watcher snapshots");
                continue;
            }
        };

        for key in keys {
            let entry = match kv.get(&key).await {
                Ok(entry) if entry.found => entry,
                _ => continue,
            };
            let snapshot: watcher_engine::WatcherSnapshot = match serde_json::from_slice(&entry.value) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    tracing::warn!(key, error = %err, "failed to parse watcher snapshot");
                    continue;
                }
            };
            let instance = key
                .rsplit('/')
                .next()
                .and_then(|basename| basename.strip_suffix(".json"))
                .unwrap_or(&snapshot.id)
                .to_string();
            let status = match snapshot.status {
                watcher_engine::SnapshotStatus::Running => "running",
                watcher_engine::SnapshotStatus::Stopped => "stopped",
                watcher_engine::SnapshotStatus::Error => "error",
            };
            let view = WatcherView {
                service: snapshot.service.clone(),
                instance,
                kv_key: snapshot.kv_key.clone(),
                status: status.to_string(),
                last_event: snapshot.last_event,
                last_error: snapshot.last_error.clone(),
                started_at: snapshot.started_at,
            };
            insert_most_recent(&mut merged, view);
        }
    }

    let mut out: Vec<WatcherView> = merged.into_values().collect();
    if let Some(filter) = &query.service {
        out.retain(|v| v.service.eq_ignore_ascii_case(filter));
    }
    out.sort_by(|a, b| (&a.service, &a.instance, &a.kv_key).cmp(&(&b.service, &b.instance, &b.kv_key)));
    Ok(Json(out))
}

fn insert_most_recent(merged: &mut HashMap<(String, String, String), WatcherView>, view: WatcherView) {
    let dedup_key = (
        view.service.to_lowercase(),
        view.instance.to_lowercase(),
        view.kv_key.to_lowercase(),
    );
    match merged.get(&dedup_key) {
        Some(existing) if existing.last_event >= view.last_event => {}
        _ => {
            merged.insert(dedup_key, view);
        }
    }
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    service: String,
    key: String,
    store_id: String,
    revision: u64,
    format: FormatView,
    origin: Origin,
    writer: String,
    updated_at: DateTime<Utc>,
    config: Value,
}

/// Resolves `service`/`query` into a descriptor, key, and KV capability,
/// fetching (and seeding from a template when missing) the stored bytes.
/// Shared by the structured and raw `get config` response paths.
async fn load_config(
    state: &AppState,
    service: &str,
    query: &ConfigQuery,
) -> Result<(&'static ServiceDescriptor, String, Vec<u8>, u64, metadata::ConfigMetadataRecord)> {
    let desc = resolve_descriptor(service, query)?;
    let key = resolve_kv_key(desc, &query.key_context())?;
    let qualified_key = qualify(state, query.kv_store_id.as_deref(), &key);
    let kv = state.resolve_kv(query.kv_store_id.as_deref())?;

    let entry = kv.get(&qualified_key).await?;

    let (bytes, revision) = if entry.found {
        (entry.value, entry.revision)
    } else {
        let bytes = seed_from_template(state, kv.as_ref(), desc, &qualified_key).await?;
        (bytes, 0)
    };

    let record = metadata::read_metadata(kv.as_ref(), &qualified_key).await;
    Ok((desc, qualified_key, bytes, revision, record))
}

/// Internal seed flow (spec §4.10 "seed"): consults KV for a
/// KV-visible template first, then the in-memory registry (spec §4.5).
/// Writes the template, records `origin=seeded, writer=system`.
async fn seed_from_template(
    state: &AppState,
    kv: &dyn kvutil::KvStore,
    desc: &ServiceDescriptor,
    qualified_key: &str,
) -> Result<Vec<u8>> {
    let template_bytes = match kv.get(&desc.template_storage_key()).await {
        Ok(entry) if entry.found => Some(entry.value),
        _ => state.templates.get(desc.name).map(|asset| asset.bytes),
    };

    let Some(bytes) = template_bytes else {
        return Err(ServiceError::TemplateUnavailable(desc.name.to_string()));
    };

    kv.put(qualified_key, bytes.clone(), 0).await?;
    metadata::record_metadata(kv, qualified_key, Origin::Seeded, "system").await;
    Ok(bytes)
}

/// `GET /api/admin/config/:service` (spec §4.10 "get config").
pub async fn get_config(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<ConfigQuery>,
) -> Result<Response> {
    let (desc, key, bytes, revision, record) = load_config(&state, &service, &query).await?;

    if query.wants_raw() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_KV_KEY, header_value(&key));
        headers.insert(HEADER_KV_STORE, header_value(query.kv_store_id.as_deref().unwrap_or(&state.config.default_kv_store_id)));
        headers.insert(HEADER_KV_REVISION, header_value(&revision.to_string()));
        headers.insert(HEADER_CONFIG_ORIGIN, header_value(&format!("{:?}", record.origin).to_lowercase()));
        headers.insert(HEADER_CONFIG_WRITER, header_value(&record.writer));
        headers.insert(HEADER_CONFIG_UPDATED_AT, header_value(&record.updated_at.to_rfc3339()));

        let content_type = match desc.format {
            ConfigFormat::Json => "application/json",
            ConfigFormat::Toml => "text/plain; charset=utf-8",
        };
        headers.insert(http::header::CONTENT_TYPE, header_value(content_type));

        return Ok((StatusCode::OK, headers, bytes).into_response());
    }

    let config_value = match desc.format {
        ConfigFormat::Json => {
            let mut value: Value = serde_json::from_slice(&bytes)
                .map_err(|e| ServiceError::InvalidPayload(e.to_string()))?;
            if let Some(fields) = redaction_eligible_fields(desc.name) {
                let owned: Vec<String> = fields.iter().map(|s| s.to_string()).collect();
                redact_sensitive_fields(&mut value, &owned);
            }
            value
        }
        ConfigFormat::Toml => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    };

    let response = ConfigResponse {
        service: desc.name.to_string(),
        key: key.clone(),
        store_id: query.kv_store_id.clone().unwrap_or_else(|| state.config.default_kv_store_id.clone()),
        revision,
        format: desc.format.into(),
        origin: record.origin,
        writer: record.writer,
        updated_at: record.updated_at,
        config: config_value,
    };

    Ok(Json(response).into_response())
}

fn header_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[derive(Debug, Serialize)]
struct UpdateResponse {
    service: String,
    key: String,
    store_id: String,
}

/// `PUT /api/admin/config/:service` (spec §4.10 "update config"): the
/// authoritative write path. TOML targets and text bodies are stored
/// raw; JSON targets are re-encoded canonically and, for
/// redaction-eligible services, have any `__SR_REDACTED__` sentinel
/// restored from the previously stored document first.
pub async fn update_config(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<ConfigQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<UpdateResponse>> {
    let desc = resolve_descriptor(&service, &query)?;
    let key = resolve_kv_key(desc, &query.key_context())?;
    let qualified_key = qualify(&state, query.kv_store_id.as_deref(), &key);
    let kv = state.resolve_kv(query.kv_store_id.as_deref())?;

    let is_text_body = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/plain"))
        .unwrap_or(false);

    let bytes = if desc.format == ConfigFormat::Toml || is_text_body {
        body.to_vec()
    } else {
        let mut incoming: Value =
            serde_json::from_slice(&body).map_err(|e| ServiceError::InvalidPayload(e.to_string()))?;

        if redaction_eligible_fields(desc.name).is_some() {
            if let Ok(previous_entry) = kv.get(&qualified_key).await {
                if previous_entry.found {
                    if let Ok(previous) = serde_json::from_slice::<Value>(&previous_entry.value) {
                        restore_redacted(&previous, &mut incoming);
                    }
                }
            }
        }

        serde_json::to_vec(&incoming).map_err(|e| ServiceError::InvalidPayload(e.to_string()))?
    };

    kv.put(&qualified_key, bytes, 0).await?;

    let writer = query
        .writer
        .clone()
        .or_else(|| {
            headers
                .get("x-serviceradar-writer")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string());
    metadata::record_metadata(kv.as_ref(), &qualified_key, Origin::User, &writer).await;

    Ok(Json(UpdateResponse {
        service: desc.name.to_string(),
        key: qualified_key,
        store_id: query.kv_store_id.unwrap_or_else(|| state.config.default_kv_store_id.clone()),
    }))
}

#[derive(Debug, Deserialize)]
pub struct InterfacePollingBody {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct InterfacePollingResponse {
    pub device: String,
    pub ifindex: String,
    pub enabled: bool,
}

fn interface_polling_key(device: &str, ifindex: &str) -> String {
    format!("prefs/snmp/interface-polling/{device}/{ifindex}.json")
}

/// `GET /api/admin/prefs/snmp/interface-polling/:device/:ifindex`
/// (spec §4.10's last row).
pub async fn get_interface_polling_pref(
    State(state): State<AppState>,
    Path((device, ifindex)): Path<(String, String)>,
) -> Result<Json<InterfacePollingResponse>> {
    let kv = state.default_kv();
    let entry = kv.get(&interface_polling_key(&device, &ifindex)).await?;
    let enabled = if entry.found {
        serde_json::from_slice::<InterfacePollingBody>(&entry.value)
            .map(|b| b.enabled)
            .unwrap_or(false)
    } else {
        false
    };
    Ok(Json(InterfacePollingResponse { device, ifindex, enabled }))
}

/// `PUT /api/admin/prefs/snmp/interface-polling/:device/:ifindex`:
/// writes the preference, then rebuilds `config/snmp-checker.json`'s
/// `ifpref_*`-named targets from the full preference set.
pub async fn put_interface_polling_pref(
    State(state): State<AppState>,
    Path((device, ifindex)): Path<(String, String)>,
    Json(body): Json<InterfacePollingBody>,
) -> Result<Json<InterfacePollingResponse>> {
    let kv = state.default_kv();
    let key = interface_polling_key(&device, &ifindex);
    let bytes = serde_json::to_vec(&body).map_err(|e| ServiceError::InvalidPayload(e.to_string()))?;
    kv.put(&key, bytes, 0).await?;

    rebuild_snmp_checker_targets(kv.as_ref()).await?;

    Ok(Json(InterfacePollingResponse {
        device,
        ifindex,
        enabled: body.enabled,
    }))
}

const SNMP_CHECKER_CONFIG_KEY: &str = "config/snmp-checker.json";
const INTERFACE_POLLING_PREFIX: &str = "prefs/snmp/interface-polling/";

/// Replaces every `config/snmp-checker.json` target whose name begins
/// with `ifpref_` with a freshly computed set derived from every stored
/// interface-polling preference (spec §4.10).
async fn rebuild_snmp_checker_targets(kv: &dyn kvutil::KvStore) -> Result<()> {
    let pref_keys = kv.list_keys(INTERFACE_POLLING_PREFIX).await?;
    let entries = kv.batch_get(&pref_keys).await?;

    let mut fresh_targets = Vec::new();
    for key in &pref_keys {
        let Some(entry) = entries.get(key) else { continue };
        if !entry.found {
            continue;
        }
        let Some(rest) = key.strip_prefix(INTERFACE_POLLING_PREFIX) else { continue };
        let Some(rest) = rest.strip_suffix(".json") else { continue };
        let Some((device, ifindex)) = rest.split_once('/') else { continue };
        let enabled = serde_json::from_slice::<InterfacePollingBody>(&entry.value)
            .map(|b| b.enabled)
            .unwrap_or(false);

        fresh_targets.push(serde_json::json!({
            "name": format!("ifpref_{device}_{ifindex}"),
            "device": device,
            "ifindex": ifindex,
            "enabled": enabled,
        }));
    }
    fresh_targets.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    let mut config = match kv.get(SNMP_CHECKER_CONFIG_KEY).await? {
        entry if entry.found => serde_json::from_slice::<Value>(&entry.value)
            .unwrap_or_else(|_| serde_json::json!({"targets": []})),
        _ => serde_json::json!({"targets": []}),
    };

    let targets = config
        .as_object_mut()
        .unwrap()
        .entry("targets")
        .or_insert_with(|| Value::Array(Vec::new()));

    if let Value::Array(existing) = targets {
        existing.retain(|t| {
            !t.get("name")
                .and_then(|n| n.as_str())
                .map(|n| n.starts_with("ifpref_"))
                .unwrap_or(false)
        });
        existing.extend(fresh_targets);
    }

    let bytes = serde_json::to_vec(&config).map_err(|e| ServiceError::InvalidPayload(e.to_string()))?;
    kv.put(SNMP_CHECKER_CONFIG_KEY, bytes, 0).await?;
    Ok(())
}
