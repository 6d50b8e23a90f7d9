//! HTTP API: event search, favorites and phone-code authentication.

mod auth;
mod error;
mod events;
mod favorites;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{info, warn, Level};

pub use error::ApiError;

use crate::auth::{SessionManager, VerificationService};
use crate::db::Database;
use crate::pipeline::SearchOrchestrator;
use crate::TARGET_WEB_REQUEST;

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orchestrator: Arc<SearchOrchestrator>,
    pub verification: Arc<VerificationService>,
    pub sessions: Arc<SessionManager>,
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "eventtrail API",
        "status": "running",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(target: TARGET_WEB_REQUEST, "ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(origins)
}

/// Builds the full router with CORS and request tracing.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let mut app = Router::new()
        .route("/", get(index))
        .route("/health", get(health));
    app = events::mount(app);
    app = favorites::mount(app);
    app = auth::mount(app);

    app.layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(state)
}

/// Serves the API on `0.0.0.0:port` until the process exits.
pub async fn serve(state: AppState, port: u16, cors_origins: &[String]) -> Result<()> {
    let app = build_router(state, cors_origins);
    let addr = format!("0.0.0.0:{}", port);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(target: TARGET_WEB_REQUEST, "Server running on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .await
        .context("HTTP server failed")?;
    Ok(())
}
