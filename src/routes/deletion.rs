use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;

use crate::constants::ERR_MALFORMED_BODY;
use crate::deletion::{dispatch, DeletionActionRequest, DeletionActionResponse};
use crate::error::{AppError, Result};
use crate::AppState;

/// Account deletion endpoint
///
/// POST /api/account-deletion with `{ "action": ..., "user_id": ... }`
///
/// # Actions
/// - `request_deletion`: schedule deletion after the 3-day grace period
/// - `cancel_deletion`: cancel the pending request
/// - `get_status`: report whether a request is pending
///
/// A body that is not a JSON object is treated like a missing `user_id`.
pub async fn handle_deletion_action(
    State(state): State<AppState>,
    payload: std::result::Result<Json<DeletionActionRequest>, JsonRejection>,
) -> Result<Json<DeletionActionResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Malformed deletion request body: {}", rejection.body_text());
        AppError::InvalidInput(ERR_MALFORMED_BODY.to_string())
    })?;

    let response = dispatch(&state.store, request, Utc::now()).await?;

    Ok(Json(response))
}
