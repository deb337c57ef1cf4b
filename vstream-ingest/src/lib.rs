//! vstream-ingest library interface
//!
//! Exposes the application state, router assembly, and core modules for
//! integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod services;

pub use crate::error::{Error, Result};

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use vstream_common::events::EventBus;

use crate::engine::CallEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Store connection pool
    pub db: SqlitePool,
    /// Event bus feeding SSE subscribers
    pub event_bus: EventBus,
    /// Per-call mutation and pipeline orchestrator
    pub engine: CallEngine,
    /// Process start, for health reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, engine: CallEngine) -> Self {
        Self {
            db,
            event_bus,
            engine,
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::call_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
        // The PBX and supervisor UIs live on other origins
        .layer(CorsLayer::permissive())
}
