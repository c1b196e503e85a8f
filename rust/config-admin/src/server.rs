//! Admin HTTP server, grounded on `srql::server::Server`'s
//! `Router`/`with_state`/`TraceLayer` shape, generalized to the admin
//! surface's route set (spec §4.10) and its `x-api-key` gate.

use crate::error::{Result, ServiceError};
use crate::handlers;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct Server {
    state: AppState,
}

impl Server {
    /// `state.config` is the single source of truth for both the listen
    /// address and the `x-api-key` gate — there is no separate
    /// server-level config to drift out of sync with it.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Builds the full route table. Exposed so integration tests can
    /// drive it with `tower::ServiceExt::oneshot` without binding a
    /// socket.
    pub fn router(&self) -> Router {
        let admin = Router::new()
            .route("/config/descriptors", get(handlers::list_descriptors))
            .route("/config/status", get(handlers::status_probe))
            .route("/watchers", get(handlers::list_watchers))
            .route(
                "/config/:service",
                get(handlers::get_config).put(handlers::update_config),
            )
            .route(
                "/prefs/snmp/interface-polling/:device/:ifindex",
                get(handlers::get_interface_polling_pref).put(handlers::put_interface_polling_pref),
            )
            .route_layer(middleware::from_fn_with_state(self.state.clone(), enforce_api_key));

        Router::new()
            .route("/healthz", get(health))
            .nest("/api/admin", admin)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "config-admin listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Gates every `/api/admin/*` route behind `x-api-key` when
/// `ADMIN_API_KEY` is configured; a missing/absent key leaves the admin
/// surface open, matching `srql`'s opt-in auth (spec §1 treats
/// authn/authz as an external Non-goal).
async fn enforce_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response> {
    if let Some(expected) = &state.config.api_key {
        let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return Err(ServiceError::PermissionDenied("invalid or missing x-api-key".to_string()));
        }
    }
    Ok(next.run(request).await)
}
