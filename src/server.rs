//! HTTP serving layer: dependency map, dashboard, orphans, alerts, ignore list.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::alerts::{collect_alerts, IgnoreList};
use crate::cache::{CacheSnapshot, GraphCache};
use crate::dashboard::render_dashboard;
use crate::error::{InspectorError, Result};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<GraphCache>,
    pub ignored: Arc<IgnoreList>,
}

/// HTTP front for a [`GraphCache`].
pub struct InspectorServer {
    state: AppState,
    allowed_origins: Vec<String>,
}

impl InspectorServer {
    pub fn new(cache: Arc<GraphCache>, allowed_origins: Vec<String>) -> Self {
        Self {
            state: AppState {
                cache,
                ignored: Arc::new(IgnoreList::new()),
            },
            allowed_origins,
        }
    }

    /// Bind `addr` and serve until the process is stopped.
    pub async fn run(&self, addr: &str) -> Result<()> {
        let app = self.create_router();

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            InspectorError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Automation Inspector listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| InspectorError::Io(std::io::Error::other(format!("HTTP server error: {}", e))))?;

        Ok(())
    }

    /// Create the axum router
    pub fn create_router(&self) -> Router {
        // Empty allowed_origins means any origin (local add-on use).
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/dependency_map.json", get(handle_dependency_map))
            .route("/dashboard.yaml", get(handle_dashboard))
            .route("/orphaned_helpers.json", get(handle_orphans))
            .route("/alerts", get(handle_alerts))
            .route("/ignore", post(handle_ignore))
            .route("/unignore", post(handle_unignore))
            .route("/health", get(handle_health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
struct MapParams {
    force: Option<String>,
}

impl MapParams {
    fn force(&self) -> bool {
        matches!(self.force.as_deref(), Some("1" | "true" | "yes"))
    }
}

#[derive(Debug, Deserialize)]
struct IgnoreBody {
    id: Option<String>,
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({"error": "dependency map not built yet"})),
    )
        .into_response()
}

async fn current(state: &AppState) -> Option<Arc<CacheSnapshot>> {
    state.cache.get(false).await
}

async fn handle_dependency_map(State(state): State<AppState>, Query(params): Query<MapParams>) -> Response {
    match state.cache.get(params.force()).await {
        Some(snap) => (StatusCode::OK, Json(&snap.graph)).into_response(),
        None => not_ready(),
    }
}

async fn handle_dashboard(State(state): State<AppState>) -> Response {
    let Some(snap) = current(&state).await else {
        return not_ready();
    };

    match render_dashboard(&snap.graph) {
        Ok(yaml) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/yaml")], yaml).into_response(),
        Err(e) => {
            log::error!("Dashboard rendering failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn handle_orphans(State(state): State<AppState>) -> Response {
    match current(&state).await {
        Some(snap) => (StatusCode::OK, Json(&snap.graph.orphans)).into_response(),
        None => not_ready(),
    }
}

async fn handle_alerts(State(state): State<AppState>) -> Response {
    match current(&state).await {
        Some(snap) => {
            let alerts = collect_alerts(&snap.graph, &state.ignored.snapshot());
            (StatusCode::OK, Json(alerts)).into_response()
        }
        None => not_ready(),
    }
}

async fn handle_ignore(State(state): State<AppState>, Json(body): Json<IgnoreBody>) -> Response {
    match body.id {
        Some(id) => {
            let ignored = state.ignored.ignore(&id);
            (StatusCode::OK, Json(serde_json::json!({"ignored": ignored}))).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "missing id"})),
        )
            .into_response(),
    }
}

async fn handle_unignore(State(state): State<AppState>, Json(body): Json<IgnoreBody>) -> Response {
    let ignored = match body.id {
        Some(id) => state.ignored.unignore(&id),
        None => state.ignored.list(),
    };
    (StatusCode::OK, Json(serde_json::json!({"ignored": ignored}))).into_response()
}

async fn handle_health(State(state): State<AppState>) -> Response {
    let built_at = state.cache.snapshot().map(|s| s.built_at);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "automation-inspector",
            "version": env!("CARGO_PKG_VERSION"),
            "cache": state.cache.state().to_string(),
            "built_at": built_at,
        })),
    )
        .into_response()
}
