//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the health probe and the canvas websocket, and serves
//! the browser clients as static files: `/atelier` and `/chantilly` map to
//! their pages, everything else falls back to the static directory.

pub mod ws;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::handle_ws))
        .route_service("/atelier", ServeFile::new(static_dir.join("atelier.html")))
        .route_service("/chantilly", ServeFile::new(static_dir.join("admin.html")))
        .fallback_service(ServeDir::new(&static_dir).append_index_html_on_directories(true))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Explicit origins when configured; otherwise permissive in development and
/// same-origin only in production.
fn cors_layer(config: &Config) -> CorsLayer {
    if !config.allowed_origins.is_empty() {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(%origin, error = %e, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        return CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any);
    }

    if config.environment.is_production() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

// =============================================================================
// HEALTH
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: String,
    pub clients: usize,
    pub shapes: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let (clients, shapes) = {
        let canvas = state.canvas.read().await;
        (canvas.clients.len(), canvas.shapes.len())
    };
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    Json(Health { status: "OK", timestamp, clients, shapes })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
