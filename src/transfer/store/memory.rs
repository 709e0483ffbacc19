//! In-memory transfer store
//!
//! One mutex guards resources, ledger and history together, so a commit is
//! trivially atomic. Used by tests and by the binary when no database is
//! configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{StoreError, TransferCommit, TransferStore};
use crate::core_types::{RegistrarId, ResourceKey};
use crate::transfer::history::HistoryEntry;
use crate::transfer::ledger::{BillingEvent, LedgerTables, PollMessage};
use crate::transfer::resource::{Resource, TransferableResource};

#[derive(Default)]
struct MemoryState {
    resources: HashMap<ResourceKey, Resource>,
    ledger: LedgerTables,
    history: Vec<HistoryEntry>,
}

#[derive(Default)]
pub struct MemoryTransferStore {
    state: Mutex<MemoryState>,
    /// Commits left to reject with a conflict
    injected_conflicts: AtomicUsize,
    commit_count: AtomicUsize,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` commits fail with a conflict, as if another
    /// writer had won each time.
    pub fn inject_conflicts(&self, n: usize) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Successful commits so far
    pub fn commit_count(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }

    /// Snapshot of the ledger tables
    pub fn ledger(&self) -> LedgerTables {
        self.lock().ledger.clone()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    async fn load_resource(&self, key: &ResourceKey) -> Result<Option<Resource>, StoreError> {
        Ok(self.lock().resources.get(key).cloned())
    }

    async fn save_resource(&self, mut resource: Resource) -> Result<Resource, StoreError> {
        let mut state = self.lock();
        let key = resource.key().clone();
        let version = state.resources.get(&key).map_or(0, |r| r.version() + 1);
        resource.base_mut().version = version;
        state.resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn commit(&self, commit: TransferCommit) -> Result<Resource, StoreError> {
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict(format!(
                "injected conflict on {}",
                commit.resource.key()
            )));
        }

        let mut state = self.lock();
        let key = commit.resource.key().clone();
        let current = state
            .resources
            .get(&key)
            .map(|r| r.version())
            .ok_or_else(|| StoreError::Conflict(format!("{} no longer exists", key)))?;
        if current != commit.expected_version {
            return Err(StoreError::Conflict(format!(
                "{} at version {}, expected {}",
                key, current, commit.expected_version
            )));
        }

        let mut resource = commit.resource;
        resource.base_mut().version = current + 1;
        let outcome = commit.batch.apply(&mut state.ledger);
        state.resources.insert(key.clone(), resource.clone());
        state.history.push(commit.history);
        self.commit_count.fetch_add(1, Ordering::SeqCst);

        debug!(
            resource = %key,
            version = current + 1,
            inserted = outcome.inserted,
            deleted = outcome.deleted,
            matured = outcome.matured,
            missing = outcome.missing,
            "Transfer commit applied"
        );
        Ok(resource)
    }

    async fn find_due_transfers(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ResourceKey>, StoreError> {
        let state = self.lock();
        let mut due: Vec<(DateTime<Utc>, ResourceKey)> = state
            .resources
            .values()
            .filter_map(|r| {
                let attempt = r.transfer_data().pending()?;
                attempt
                    .window_elapsed(now)
                    .then(|| (attempt.pending_expiration_time, r.key().clone()))
            })
            .collect();
        due.sort();
        Ok(due.into_iter().take(limit).map(|(_, key)| key).collect())
    }

    async fn poll_messages_for(
        &self,
        registrar: &RegistrarId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollMessage>, StoreError> {
        let state = self.lock();
        let mut messages: Vec<PollMessage> = state
            .ledger
            .poll_messages
            .values()
            .filter(|m| &m.registrar_id == registrar && m.is_deliverable(now))
            .cloned()
            .collect();
        messages.sort_by(|a, b| (a.event_time, a.id).cmp(&(b.event_time, b.id)));
        Ok(messages)
    }

    async fn billing_events_for(
        &self,
        key: &ResourceKey,
    ) -> Result<Vec<BillingEvent>, StoreError> {
        let state = self.lock();
        Ok(state
            .ledger
            .billing_events
            .values()
            .filter(|e| &e.resource_key == key)
            .cloned()
            .collect())
    }

    async fn history_for(&self, key: &ResourceKey) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.lock();
        Ok(state
            .history
            .iter()
            .filter(|h| &h.resource_key == key)
            .cloned()
            .collect())
    }
}
