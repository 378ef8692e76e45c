//! Account Deletion Request Server Library
//!
//! This module exports the core types and functions for testing and reuse.

pub mod config;
pub mod constants;
pub mod db;
pub mod deletion;
pub mod error;
pub mod models;
pub mod routes;

pub use config::Config;
pub use db::{EmbeddedStore, PgStore, Store};
pub use error::{AppError, Result};

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Config,
}

impl AppState {
    /// Create a new AppState with the given store and configuration
    pub fn new(store: Store, config: Config) -> Self {
        Self { store, config }
    }
}

/// CORS policy: any origin by default, otherwise the configured list
fn cors_layer(config: &Config) -> CorsLayer {
    let allow_origin: AllowOrigin = if config.allows_any_origin() {
        Any.into()
    } else {
        AllowOrigin::list(config.allowed_origins.iter().filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| tracing::warn!("Ignoring invalid CORS origin: {}", origin))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let router = Router::new()
        .route("/health", get(routes::health_check))
        .route(
            "/api/account-deletion",
            post(routes::handle_deletion_action),
        )
        .route("/admin/stats", get(routes::admin_stats))
        .route("/admin/deletions/complete-due", post(routes::complete_due));

    let router = if state.config.log_requests {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.layer(cors).with_state(state)
}
