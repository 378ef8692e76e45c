use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::constants::{ERR_ALREADY_PENDING, ERR_NO_PENDING_REQUEST};
use crate::models::DeletionRequest;

/// Application error type
///
/// Storage-layer variants are transparent so their message reaches the
/// caller unchanged.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Database(#[from] redb::Error),

    #[error(transparent)]
    DatabaseOpen(#[from] redb::DatabaseError),

    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),

    #[error(transparent)]
    Table(#[from] redb::TableError),

    #[error(transparent)]
    Storage(#[from] redb::StorageError),

    #[error(transparent)]
    Commit(#[from] redb::CommitError),

    #[error(transparent)]
    Postgres(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::error::EncodeError),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bincode::error::DecodeError),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Storage contention: {0}")]
    Contention(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{}", ERR_ALREADY_PENDING)]
    DeletionAlreadyPending(Box<DeletionRequest>),

    #[error("{}", ERR_NO_PENDING_REQUEST)]
    NoPendingDeletion,

    #[error("Unauthorized")]
    Unauthorized,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::DeletionAlreadyPending(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NoPendingDeletion => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AppError::InvalidInput(ref msg) => json!({ "error": msg }),
            AppError::DeletionAlreadyPending(ref existing) => json!({
                "error": ERR_ALREADY_PENDING,
                "deletion_request": existing,
            }),
            ref other => {
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal error: {:?}", other);
                }
                json!({ "error": other.to_string() })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
