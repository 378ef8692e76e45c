pub mod embedded;
pub mod pool;
pub mod postgres;
pub mod tables;

use chrono::{DateTime, Utc};

pub use embedded::{open_database, Db, EmbeddedStore};
pub use pool::create_pool;
pub use postgres::PgStore;

use crate::config::Config;
use crate::error::Result;
use crate::models::{DeletionRequest, StatusCounts};

/// Result of a conditional pending-request insert
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// A new pending request was stored
    Created(DeletionRequest),
    /// The user already had a pending request; nothing was written
    AlreadyPending(DeletionRequest),
}

/// Handle to the deletion request table, shared across handlers
///
/// Both backends give the same guarantees: at most one pending request per
/// user, and check-then-write operations that are atomic under concurrency.
#[derive(Clone)]
pub enum Store {
    Embedded(EmbeddedStore),
    Postgres(PgStore),
}

impl Store {
    /// Open the backend selected by configuration
    ///
    /// PostgreSQL when `DATABASE_URL` is set, otherwise the embedded redb file.
    pub async fn from_config(config: &Config) -> Result<Self> {
        match &config.database_url {
            Some(url) => {
                let pool = create_pool(url, config.database_max_connections).await?;
                let store = PgStore::new(pool);
                store.migrate().await?;
                Ok(Store::Postgres(store))
            }
            None => Ok(Store::Embedded(EmbeddedStore::open(&config.database_path)?)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Embedded(_) => "redb",
            Store::Postgres(_) => "postgres",
        }
    }

    pub async fn insert_pending(&self, user_id: &str, now: DateTime<Utc>) -> Result<InsertOutcome> {
        match self {
            Store::Embedded(store) => store.insert_pending(user_id, now).await,
            Store::Postgres(store) => store.insert_pending(user_id, now).await,
        }
    }

    pub async fn cancel_pending(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeletionRequest>> {
        match self {
            Store::Embedded(store) => store.cancel_pending(user_id, now).await,
            Store::Postgres(store) => store.cancel_pending(user_id, now).await,
        }
    }

    pub async fn find_pending(&self, user_id: &str) -> Result<Option<DeletionRequest>> {
        match self {
            Store::Embedded(store) => store.find_pending(user_id).await,
            Store::Postgres(store) => store.find_pending(user_id).await,
        }
    }

    pub async fn complete_due(&self, now: DateTime<Utc>) -> Result<Vec<DeletionRequest>> {
        match self {
            Store::Embedded(store) => store.complete_due(now).await,
            Store::Postgres(store) => store.complete_due(now).await,
        }
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        match self {
            Store::Embedded(store) => store.status_counts().await,
            Store::Postgres(store) => store.status_counts().await,
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self {
            Store::Embedded(store) => store.ping().await,
            Store::Postgres(store) => store.ping().await,
        }
    }

    /// On-disk size for the embedded backend; PostgreSQL reports none
    pub fn size_on_disk(&self) -> Option<u64> {
        match self {
            Store::Embedded(store) => Some(store.size_on_disk()),
            Store::Postgres(_) => None,
        }
    }
}
