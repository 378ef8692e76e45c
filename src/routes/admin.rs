use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::deletion::complete_due_deletions;
use crate::models::{DeletionRequest, StatusCounts};
use crate::{config::Config, error::Result, AppError, AppState};

/// Query parameters for admin endpoints
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    /// Admin secret key for authentication
    #[serde(default)]
    pub key: String,
}

/// Deletion request statistics response
#[derive(Debug, Serialize)]
pub struct AdminStatsResponse {
    pub backend: &'static str,
    pub requests: StatusCounts,
    pub total_requests: u64,
    pub database_size_bytes: Option<u64>,
    pub database_size_human: Option<String>,
}

/// Due-request finalization response
#[derive(Debug, Serialize)]
pub struct CompleteDueResponse {
    pub success: bool,
    pub completed_count: usize,
    pub completed: Vec<DeletionRequest>,
}

/// Format bytes into human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Admin endpoints are disabled unless a key is configured
fn authorize(config: &Config, provided: &str) -> Result<()> {
    let admin_key = config
        .admin_secret_key
        .as_ref()
        .ok_or(AppError::Unauthorized)?;

    let matches: bool = provided.as_bytes().ct_eq(admin_key.as_bytes()).into();
    if !matches {
        tracing::warn!("Invalid admin key attempt");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

/// Admin stats endpoint
///
/// Returns deletion request counts per status, plus the database file size
/// for the embedded backend.
///
/// GET /admin/stats?key=<admin_secret_key>
pub async fn admin_stats(
    State(state): State<AppState>,
    Query(params): Query<AdminQuery>,
) -> Result<Json<AdminStatsResponse>> {
    authorize(&state.config, &params.key)?;

    let requests = state.store.status_counts().await?;
    let database_size_bytes = state.store.size_on_disk();

    tracing::info!(
        "Admin stats requested: {} pending, {} cancelled, {} completed",
        requests.pending,
        requests.cancelled,
        requests.completed
    );

    Ok(Json(AdminStatsResponse {
        backend: state.store.backend_name(),
        total_requests: requests.total(),
        requests,
        database_size_bytes,
        database_size_human: database_size_bytes.map(format_bytes),
    }))
}

/// Finalize deletion requests whose grace period has elapsed
///
/// Intended to be called by an external scheduler. Returns the requests it
/// completed so the caller can erase those accounts.
///
/// POST /admin/deletions/complete-due?key=<admin_secret_key>
pub async fn complete_due(
    State(state): State<AppState>,
    Query(params): Query<AdminQuery>,
) -> Result<Json<CompleteDueResponse>> {
    authorize(&state.config, &params.key)?;

    let completed = complete_due_deletions(&state.store, Utc::now()).await?;

    Ok(Json(CompleteDueResponse {
        success: true,
        completed_count: completed.len(),
        completed,
    }))
}
