//! ssedoc-core library interface
//!
//! Exposes the session pipeline, extractors and router for integration testing

pub mod api;
pub mod error;
pub mod extractors;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use extractors::ExtractorTable;
use session::{SessionOrchestrator, SessionRegistry, SessionSettings};
use ssedoc_common::config::TomlConfig;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Open upload sessions
    pub registry: SessionRegistry,
    /// Session starter sharing `registry`
    pub sessions: SessionOrchestrator,
    /// Loaded configuration
    pub config: Arc<TomlConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: TomlConfig) -> Self {
        let extractors = ExtractorTable::standard(config.upload.csv_preview_rows);
        Self::with_extractors(config, extractors)
    }

    /// State with a custom dispatch table
    pub fn with_extractors(config: TomlConfig, extractors: ExtractorTable) -> Self {
        let registry = SessionRegistry::new();
        let sessions = SessionOrchestrator::new(
            registry.clone(),
            Arc::new(extractors),
            SessionSettings::from_config(&config.upload),
        );

        Self {
            registry,
            sessions,
            config: Arc::new(config),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_body_bytes;

    Router::new()
        .merge(api::upload_routes())
        .merge(api::sse_routes())
        .merge(api::health_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        // Enable CORS for browser clients on other origins
        .layer(CorsLayer::permissive())
}
