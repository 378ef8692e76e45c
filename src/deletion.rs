//! Account deletion request lifecycle
//!
//! Per user: `(none) -> pending -> {cancelled | completed}`. This module owns
//! the transitions out of `none` and `pending`; the storage layer guarantees
//! they are atomic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    ACTION_CANCEL_DELETION, ACTION_GET_STATUS, ACTION_REQUEST_DELETION, ERR_INVALID_ACTION,
    ERR_MISSING_USER_ID, MAX_USER_ID_LEN, MSG_DELETION_CANCELLED, MSG_DELETION_SCHEDULED,
};
use crate::db::{InsertOutcome, Store};
use crate::error::{AppError, Result};
use crate::models::DeletionRequest;

/// Operation selected by the `action` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionAction {
    RequestDeletion,
    CancelDeletion,
    GetStatus,
}

impl DeletionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionAction::RequestDeletion => ACTION_REQUEST_DELETION,
            DeletionAction::CancelDeletion => ACTION_CANCEL_DELETION,
            DeletionAction::GetStatus => ACTION_GET_STATUS,
        }
    }
}

impl fmt::Display for DeletionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            ACTION_REQUEST_DELETION => Ok(DeletionAction::RequestDeletion),
            ACTION_CANCEL_DELETION => Ok(DeletionAction::CancelDeletion),
            ACTION_GET_STATUS => Ok(DeletionAction::GetStatus),
            _ => Err(AppError::InvalidInput(ERR_INVALID_ACTION.to_string())),
        }
    }
}

/// Body of a call to the deletion endpoint
#[derive(Debug, Default, Deserialize)]
pub struct DeletionActionRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response for actions that change a request
#[derive(Debug, Serialize)]
pub struct DeletionChangeResponse {
    pub success: bool,
    pub message: String,
    pub deletion_request: DeletionRequest,
}

/// Response for `get_status`
#[derive(Debug, Serialize)]
pub struct DeletionStatusResponse {
    pub has_pending_request: bool,
    pub deletion_request: Option<DeletionRequest>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DeletionActionResponse {
    Changed(DeletionChangeResponse),
    Status(DeletionStatusResponse),
}

/// Schedule deletion of the user's account one grace period from `now`
///
/// Fails with `DeletionAlreadyPending` (carrying the existing request) when
/// the user already has a pending request.
pub async fn request_deletion(
    store: &Store,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<DeletionRequest> {
    match store.insert_pending(user_id, now).await? {
        InsertOutcome::Created(request) => {
            tracing::info!(
                "request_deletion: scheduled deletion {} for user {} at {}",
                request.id,
                user_id,
                request.scheduled_deletion_at.to_rfc3339()
            );
            Ok(request)
        }
        InsertOutcome::AlreadyPending(existing) => {
            tracing::info!(
                "request_deletion: user {} already has pending request {}",
                user_id,
                existing.id
            );
            Err(AppError::DeletionAlreadyPending(Box::new(existing)))
        }
    }
}

/// Cancel the user's pending deletion request
pub async fn cancel_deletion(
    store: &Store,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<DeletionRequest> {
    match store.cancel_pending(user_id, now).await? {
        Some(request) => {
            tracing::info!(
                "cancel_deletion: cancelled request {} for user {}",
                request.id,
                user_id
            );
            Ok(request)
        }
        None => {
            tracing::info!("cancel_deletion: no pending request for user {}", user_id);
            Err(AppError::NoPendingDeletion)
        }
    }
}

pub async fn get_status(store: &Store, user_id: &str) -> Result<DeletionStatusResponse> {
    let pending = store.find_pending(user_id).await?;

    tracing::info!(
        "get_status: user {} has pending request: {}",
        user_id,
        pending.is_some()
    );

    Ok(DeletionStatusResponse {
        has_pending_request: pending.is_some(),
        deletion_request: pending,
    })
}

/// Validate a user ID from a request body and return its trimmed form
///
/// Rejects missing, blank, overlong, and control-character IDs.
pub fn validate_user_id(user_id: Option<&str>) -> Result<String> {
    let user_id = user_id.map(str::trim).unwrap_or_default();

    if user_id.is_empty() {
        return Err(AppError::InvalidInput(ERR_MISSING_USER_ID.to_string()));
    }

    if user_id.chars().count() > MAX_USER_ID_LEN {
        return Err(AppError::InvalidInput(format!(
            "user_id must be at most {} characters",
            MAX_USER_ID_LEN
        )));
    }

    if user_id.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(
            "user_id must not contain control characters".to_string(),
        ));
    }

    Ok(user_id.to_string())
}

/// Validate a raw action call and run it
///
/// The user ID and the action are both checked before the store is touched.
pub async fn dispatch(
    store: &Store,
    request: DeletionActionRequest,
    now: DateTime<Utc>,
) -> Result<DeletionActionResponse> {
    let action_name = request.action.as_deref().unwrap_or_default();

    let user_id = validate_user_id(request.user_id.as_deref()).inspect_err(|e| {
        tracing::warn!("Rejected {:?} call: {}", action_name, e);
    })?;

    let action = action_name.parse::<DeletionAction>().inspect_err(|_| {
        tracing::warn!("Unknown action {:?} for user {}", action_name, user_id);
    })?;

    tracing::info!("Handling {} for user {}", action, user_id);

    let response = match action {
        DeletionAction::RequestDeletion => {
            let deletion_request = request_deletion(store, &user_id, now).await?;
            DeletionActionResponse::Changed(DeletionChangeResponse {
                success: true,
                message: MSG_DELETION_SCHEDULED.to_string(),
                deletion_request,
            })
        }
        DeletionAction::CancelDeletion => {
            let deletion_request = cancel_deletion(store, &user_id, now).await?;
            DeletionActionResponse::Changed(DeletionChangeResponse {
                success: true,
                message: MSG_DELETION_CANCELLED.to_string(),
                deletion_request,
            })
        }
        DeletionAction::GetStatus => {
            DeletionActionResponse::Status(get_status(store, &user_id).await?)
        }
    };

    Ok(response)
}

/// Finalize every pending request whose grace period has elapsed
///
/// Marks them completed and returns them so the caller can erase the
/// accounts. Account data itself is not touched here.
pub async fn complete_due_deletions(
    store: &Store,
    now: DateTime<Utc>,
) -> Result<Vec<DeletionRequest>> {
    let completed = store.complete_due(now).await?;

    for request in &completed {
        tracing::info!(
            "complete_due: request {} for user {} completed",
            request.id,
            request.user_id
        );
    }
    tracing::info!("complete_due: {} request(s) completed", completed.len());

    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    use crate::db::EmbeddedStore;
    use crate::models::{storage_time, DeletionStatus};

    fn open_test_store() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let store = EmbeddedStore::open(temp_dir.path().join("test.db")).unwrap();
        (temp_dir, Store::Embedded(store))
    }

    fn call(action: &str, user_id: &str) -> DeletionActionRequest {
        DeletionActionRequest {
            action: Some(action.to_string()),
            user_id: Some(user_id.to_string()),
        }
    }

    #[test]
    fn test_validate_user_id() {
        // Typical auth-provider UUID
        assert_eq!(
            validate_user_id(Some("6f1c2a8e-3b4d-4e5f-9a0b-1c2d3e4f5a6b")).unwrap(),
            "6f1c2a8e-3b4d-4e5f-9a0b-1c2d3e4f5a6b"
        );

        // Surrounding whitespace is stripped
        assert_eq!(validate_user_id(Some("  u1\n")).unwrap(), "u1");

        // Missing or blank
        assert!(validate_user_id(None).is_err());
        assert!(validate_user_id(Some("")).is_err());
        assert!(validate_user_id(Some(" \t ")).is_err());

        // Too long
        let long_id = "a".repeat(MAX_USER_ID_LEN + 1);
        assert!(validate_user_id(Some(&long_id)).is_err());
        let max_id = "a".repeat(MAX_USER_ID_LEN);
        assert!(validate_user_id(Some(&max_id)).is_ok());

        // Control characters inside the ID
        assert!(validate_user_id(Some("u\u{0}1")).is_err());
    }

    #[test]
    fn test_missing_user_id_message() {
        match validate_user_id(None) {
            Err(AppError::InvalidInput(msg)) => assert_eq!(msg, ERR_MISSING_USER_ID),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(
            "request_deletion".parse::<DeletionAction>().unwrap(),
            DeletionAction::RequestDeletion
        );
        assert_eq!(
            "cancel_deletion".parse::<DeletionAction>().unwrap(),
            DeletionAction::CancelDeletion
        );
        assert_eq!(
            "get_status".parse::<DeletionAction>().unwrap(),
            DeletionAction::GetStatus
        );

        match "delete_now".parse::<DeletionAction>() {
            Err(AppError::InvalidInput(msg)) => {
                assert!(msg.contains("request_deletion"));
                assert!(msg.contains("cancel_deletion"));
                assert!(msg.contains("get_status"));
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_deletion_schedules_grace_period() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());

        let request = request_deletion(&store, "u1", now).await.unwrap();

        assert_eq!(request.status, DeletionStatus::Pending);
        assert_eq!(request.scheduled_deletion_at, now + Duration::days(3));
    }

    #[tokio::test]
    async fn test_second_request_conflicts_with_existing() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());

        let first = request_deletion(&store, "u1", now).await.unwrap();
        let later = now + Duration::hours(1);

        match request_deletion(&store, "u1", later).await {
            Err(AppError::DeletionAlreadyPending(existing)) => {
                assert_eq!(existing.id, first.id);
                assert_eq!(existing.scheduled_deletion_at, first.scheduled_deletion_at);
            }
            other => panic!("expected DeletionAlreadyPending, got {:?}", other),
        }

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_pending_is_not_found() {
        let (_dir, store) = open_test_store();

        let result = cancel_deletion(&store, "nobody", Utc::now()).await;

        assert!(matches!(result, Err(AppError::NoPendingDeletion)));
        assert_eq!(store.status_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_request_cancel_status_scenario() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());

        match dispatch(&store, call("request_deletion", "u1"), now)
            .await
            .unwrap()
        {
            DeletionActionResponse::Changed(resp) => {
                assert!(resp.success);
                assert_eq!(resp.deletion_request.status, DeletionStatus::Pending);
            }
            other => panic!("unexpected response {:?}", other),
        }

        match dispatch(&store, call("cancel_deletion", "u1"), now)
            .await
            .unwrap()
        {
            DeletionActionResponse::Changed(resp) => {
                assert_eq!(resp.deletion_request.status, DeletionStatus::Cancelled);
                assert_eq!(resp.deletion_request.cancelled_at, Some(now));
            }
            other => panic!("unexpected response {:?}", other),
        }

        match dispatch(&store, call("get_status", "u1"), now).await.unwrap() {
            DeletionActionResponse::Status(status) => {
                assert!(!status.has_pending_request);
                assert!(status.deletion_request.is_none());
            }
            other => panic!("unexpected response {:?}", other),
        }

        // A new request is allowed after cancelling
        assert!(request_deletion(&store, "u1", now).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_rejects_missing_user_id() {
        let (_dir, store) = open_test_store();

        for user_id in [None, Some(String::new()), Some("   ".to_string())] {
            let request = DeletionActionRequest {
                action: Some("request_deletion".to_string()),
                user_id,
            };
            let result = dispatch(&store, request, Utc::now()).await;
            assert!(matches!(result, Err(AppError::InvalidInput(_))));
        }

        assert_eq!(store.status_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_action() {
        let (_dir, store) = open_test_store();

        let result = dispatch(&store, call("purge", "u1"), Utc::now()).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        let missing = DeletionActionRequest {
            action: None,
            user_id: Some("u1".to_string()),
        };
        let result = dispatch(&store, missing, Utc::now()).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_dispatch_trims_user_id() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());

        dispatch(&store, call("request_deletion", "  u1 "), now)
            .await
            .unwrap();

        let status = get_status(&store, "u1").await.unwrap();
        assert!(status.has_pending_request);
        assert_eq!(status.deletion_request.unwrap().user_id, "u1");
    }

    #[tokio::test]
    async fn test_complete_due_deletions() {
        let (_dir, store) = open_test_store();
        let now = storage_time(Utc::now());
        request_deletion(&store, "u1", now).await.unwrap();

        // Nothing is due before the grace period ends
        let early = complete_due_deletions(&store, now + Duration::days(2))
            .await
            .unwrap();
        assert!(early.is_empty());

        let due = complete_due_deletions(&store, now + Duration::days(3))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, DeletionStatus::Completed);

        let status = get_status(&store, "u1").await.unwrap();
        assert!(!status.has_pending_request);
        assert!(matches!(
            cancel_deletion(&store, "u1", now).await,
            Err(AppError::NoPendingDeletion)
        ));
    }
}
