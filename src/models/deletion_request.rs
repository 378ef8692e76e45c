use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::GRACE_PERIOD_DAYS;
use crate::error::AppError;

/// Lifecycle state of a deletion request
///
/// `Pending` is the only state with outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStatus {
    Pending,
    Cancelled,
    Completed,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::Cancelled => "cancelled",
            DeletionStatus::Completed => "completed",
        }
    }
}

impl FromStr for DeletionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeletionStatus::Pending),
            "cancelled" => Ok(DeletionStatus::Cancelled),
            "completed" => Ok(DeletionStatus::Completed),
            other => Err(format!("Unknown deletion status: {}", other)),
        }
    }
}

/// Deletion request model for API responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: Uuid,
    pub user_id: String,
    pub status: DeletionStatus,
    pub requested_at: DateTime<Utc>,
    pub scheduled_deletion_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeletionRequest {
    /// Build a new pending request whose deadline is one grace period after `now`
    pub fn new_pending(user_id: &str, now: DateTime<Utc>) -> Self {
        let now = storage_time(now);
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            status: DeletionStatus::Pending,
            requested_at: now,
            scheduled_deletion_at: scheduled_deletion_time(now),
            cancelled_at: None,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeletionStatus::Pending
    }

    /// Whether the grace period has elapsed for a pending request
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.scheduled_deletion_at <= now
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = DeletionStatus::Cancelled;
        self.cancelled_at = Some(storage_time(now));
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = DeletionStatus::Completed;
        self.completed_at = Some(storage_time(now));
    }
}

/// Timestamps are kept at microsecond precision, the resolution of both backends
pub fn storage_time(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

/// Deadline for a request created at `now`
pub fn scheduled_deletion_time(now: DateTime<Utc>) -> DateTime<Utc> {
    storage_time(now) + Duration::days(GRACE_PERIOD_DAYS)
}

/// Deletion request stored in redb
/// Uses Unix timestamps in microseconds for compact storage with bincode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRequestRecord {
    pub id: String,
    pub user_id: String,
    pub status: DeletionStatus,
    pub requested_at: i64,
    pub scheduled_deletion_at: i64,
    pub cancelled_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<&DeletionRequest> for DeletionRequestRecord {
    fn from(request: &DeletionRequest) -> Self {
        Self {
            id: request.id.to_string(),
            user_id: request.user_id.clone(),
            status: request.status,
            requested_at: request.requested_at.timestamp_micros(),
            scheduled_deletion_at: request.scheduled_deletion_at.timestamp_micros(),
            cancelled_at: request.cancelled_at.map(|t| t.timestamp_micros()),
            completed_at: request.completed_at.map(|t| t.timestamp_micros()),
        }
    }
}

impl TryFrom<DeletionRequestRecord> for DeletionRequest {
    type Error = AppError;

    fn try_from(record: DeletionRequestRecord) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&record.id).map_err(|e| {
            AppError::CorruptRecord(format!("invalid request id {:?}: {}", record.id, e))
        })?;

        Ok(Self {
            id,
            user_id: record.user_id,
            status: record.status,
            requested_at: micros_to_datetime(record.requested_at)?,
            scheduled_deletion_at: micros_to_datetime(record.scheduled_deletion_at)?,
            cancelled_at: record.cancelled_at.map(micros_to_datetime).transpose()?,
            completed_at: record.completed_at.map(micros_to_datetime).transpose()?,
        })
    }
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| AppError::CorruptRecord(format!("timestamp out of range: {}", micros)))
}

/// Count of stored requests per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub cancelled: u64,
    pub completed: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: DeletionStatus) {
        match status {
            DeletionStatus::Pending => self.pending += 1,
            DeletionStatus::Cancelled => self.cancelled += 1,
            DeletionStatus::Completed => self.completed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.cancelled + self.completed
    }
}
