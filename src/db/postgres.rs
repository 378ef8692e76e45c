use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::InsertOutcome;
use crate::error::{AppError, Result};
use crate::models::{DeletionRequest, DeletionStatus, StatusCounts};

/// Attempts at inserting a pending row when the conflicting row disappears
/// between the insert and the follow-up lookup
const MAX_INSERT_ATTEMPTS: usize = 3;

/// Deletion request store backed by PostgreSQL
///
/// The partial unique index on `(user_id) WHERE status = 'pending'` holds the
/// one-pending-per-user invariant; every write is a single conditional statement.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct DeletionRequestRow {
    id: Uuid,
    user_id: String,
    status: String,
    requested_at: DateTime<Utc>,
    scheduled_deletion_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeletionRequestRow> for DeletionRequest {
    type Error = AppError;

    fn try_from(row: DeletionRequestRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status.parse::<DeletionStatus>().map_err(AppError::CorruptRecord)?,
            requested_at: row.requested_at,
            scheduled_deletion_at: row.scheduled_deletion_at,
            cancelled_at: row.cancelled_at,
            completed_at: row.completed_at,
        })
    }
}

fn into_requests(rows: Vec<DeletionRequestRow>) -> Result<Vec<DeletionRequest>> {
    rows.into_iter().map(DeletionRequest::try_from).collect()
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Postgres(e.into()))?;
        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Insert a pending request unless the user already has one
    pub async fn insert_pending(&self, user_id: &str, now: DateTime<Utc>) -> Result<InsertOutcome> {
        for _ in 0..MAX_INSERT_ATTEMPTS {
            let request = DeletionRequest::new_pending(user_id, now);

            let inserted = sqlx::query_as::<_, DeletionRequestRow>(
                "INSERT INTO account_deletion_requests \
                     (id, user_id, status, requested_at, scheduled_deletion_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (user_id) WHERE status = 'pending' DO NOTHING \
                 RETURNING id, user_id, status, requested_at, scheduled_deletion_at, \
                     cancelled_at, completed_at",
            )
            .bind(request.id)
            .bind(&request.user_id)
            .bind(DeletionStatus::Pending.as_str())
            .bind(request.requested_at)
            .bind(request.scheduled_deletion_at)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = inserted {
                return Ok(InsertOutcome::Created(row.try_into()?));
            }

            if let Some(existing) = self.find_pending(user_id).await? {
                return Ok(InsertOutcome::AlreadyPending(existing));
            }

            tracing::debug!(
                "Pending request for user {} vanished during insert, retrying",
                user_id
            );
        }

        Err(AppError::Contention(format!(
            "could not settle pending request for user {}",
            user_id
        )))
    }

    /// Move the user's pending request to cancelled, if there is one
    pub async fn cancel_pending(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeletionRequest>> {
        let row = sqlx::query_as::<_, DeletionRequestRow>(
            "UPDATE account_deletion_requests \
             SET status = 'cancelled', cancelled_at = $2 \
             WHERE user_id = $1 AND status = 'pending' \
             RETURNING id, user_id, status, requested_at, scheduled_deletion_at, \
                 cancelled_at, completed_at",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeletionRequest::try_from).transpose()
    }

    /// The user's pending request, if any
    pub async fn find_pending(&self, user_id: &str) -> Result<Option<DeletionRequest>> {
        let row = sqlx::query_as::<_, DeletionRequestRow>(
            "SELECT id, user_id, status, requested_at, scheduled_deletion_at, \
                 cancelled_at, completed_at \
             FROM account_deletion_requests \
             WHERE user_id = $1 AND status = 'pending' \
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeletionRequest::try_from).transpose()
    }

    /// Complete every pending request whose deadline is at or before `now`
    pub async fn complete_due(&self, now: DateTime<Utc>) -> Result<Vec<DeletionRequest>> {
        let rows = sqlx::query_as::<_, DeletionRequestRow>(
            "UPDATE account_deletion_requests \
             SET status = 'completed', completed_at = $1 \
             WHERE status = 'pending' AND scheduled_deletion_at <= $1 \
             RETURNING id, user_id, status, requested_at, scheduled_deletion_at, \
                 cancelled_at, completed_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        into_requests(rows)
    }

    /// Number of stored requests per status
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM account_deletion_requests GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.parse::<DeletionStatus>().map_err(AppError::CorruptRecord)? {
                DeletionStatus::Pending => counts.pending = count,
                DeletionStatus::Cancelled => counts.cancelled = count,
                DeletionStatus::Completed => counts.completed = count,
            }
        }

        Ok(counts)
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
