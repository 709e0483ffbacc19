//! Transfer Store
//!
//! Persistence seam for resources, their side-effect ledger and history.
//! A [`TransferCommit`] is all-or-nothing: the resource write, every ledger
//! write and the history entry land together or not at all. Concurrent
//! transitions on one resource are serialized by its version counter.

pub mod memory;
pub mod postgres;

pub use memory::MemoryTransferStore;
pub use postgres::PgTransferStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::history::HistoryEntry;
use super::ledger::{BillingEvent, LedgerBatch, PollMessage};
use super::resource::Resource;
use crate::core_types::{RegistrarId, ResourceKey};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another transition committed first; reload and retry
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Worth retrying the whole transition
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => StoreError::Conflict(e.to_string()),
                _ => StoreError::Database(e.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// One transition, committed atomically
#[derive(Debug, Clone)]
pub struct TransferCommit {
    /// Next resource state; its version is assigned by the store
    pub resource: Resource,
    /// Version the transition was evaluated against
    pub expected_version: u64,
    pub batch: LedgerBatch,
    pub history: HistoryEntry,
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn load_resource(&self, key: &ResourceKey) -> Result<Option<Resource>, StoreError>;

    /// Insert or replace a resource outside the transfer lifecycle
    /// (provisioning). Returns the stored copy.
    async fn save_resource(&self, resource: Resource) -> Result<Resource, StoreError>;

    /// Apply a transition if the resource is still at `expected_version`.
    /// Returns the stored resource with its new version.
    async fn commit(&self, commit: TransferCommit) -> Result<Resource, StoreError>;

    /// Pending transfers whose response window has elapsed at `now`,
    /// earliest expiration first
    async fn find_due_transfers(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ResourceKey>, StoreError>;

    /// Mailbox of `registrar`: messages deliverable at `now`, oldest first
    async fn poll_messages_for(
        &self,
        registrar: &RegistrarId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollMessage>, StoreError>;

    async fn billing_events_for(&self, key: &ResourceKey)
    -> Result<Vec<BillingEvent>, StoreError>;

    async fn history_for(&self, key: &ResourceKey) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(StoreError::Conflict("v1".into()).is_retryable());
        assert!(StoreError::Unavailable("pool".into()).is_retryable());
        assert!(!StoreError::Corrupt("bad json".into()).is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let e: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(e, StoreError::Unavailable(_)));

        let e: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(e, StoreError::Database(_)));
    }
}
