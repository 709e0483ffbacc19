//! Side Effect Ledger
//!
//! Poll messages and deferred billing events produced by transfer
//! transitions. The evaluator describes what should change as a
//! [`LedgerDiff`]; [`SideEffectLedger::materialize`] checks it and turns it
//! into an ordered [`LedgerBatch`], which the store applies in the same
//! transaction as the resource write.
//!
//! # Safety Invariants
//!
//! 1. **One transfer charge per attempt**: a diff never creates two transfer
//!    billing events for the same transfer id
//! 2. **Keep xor delete**: a speculative record may be matured or deleted,
//!    never both
//! 3. **Delete is idempotent**: deleting a record that no longer exists is
//!    counted, not failed

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::data::TransferResponse;
use super::error::TransferError;
use crate::core_types::{EntityId, EntityKey, EntityKind, RegistrarId, ResourceKey, TransferId};

// ============================================================================
// Records
// ============================================================================

/// Notification for a registrar's mailbox. Deliverable from `event_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollMessage {
    pub id: EntityId,
    pub registrar_id: RegistrarId,
    pub resource_key: ResourceKey,
    pub transfer_id: TransferId,
    pub event_time: DateTime<Utc>,
    pub message: String,
    pub payload: TransferResponse,
}

impl PollMessage {
    pub fn new(
        registrar_id: RegistrarId,
        resource_key: ResourceKey,
        event_time: DateTime<Utc>,
        payload: TransferResponse,
    ) -> Self {
        Self {
            id: EntityId::new(),
            registrar_id,
            resource_key,
            transfer_id: payload.transfer_id.unwrap_or_default(),
            event_time,
            message: payload.status.message().to_string(),
            payload,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::poll_message(self.id)
    }

    pub fn is_deliverable(&self, now: DateTime<Utc>) -> bool {
        self.event_time <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingReason {
    /// One-time charge for the transfer period
    Transfer,
    /// Gaining registrar's recurring autorenew from the new expiry
    Autorenew,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingStatus {
    /// Written at request time, effective only if the transfer completes
    Deferred,
    /// Transfer completed; the event stands
    Matured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: EntityId,
    pub registrar_id: RegistrarId,
    pub resource_key: ResourceKey,
    pub transfer_id: TransferId,
    pub reason: BillingReason,
    pub period_years: u32,
    pub cost: Decimal,
    pub currency: String,
    pub event_time: DateTime<Utc>,
    pub status: BillingStatus,
}

impl BillingEvent {
    /// Deferred one-time transfer charge, effective at `effective_time`
    pub fn deferred_transfer(
        registrar_id: RegistrarId,
        resource_key: ResourceKey,
        transfer_id: TransferId,
        period_years: u32,
        cost: Decimal,
        currency: &str,
        effective_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            registrar_id,
            resource_key,
            transfer_id,
            reason: BillingReason::Transfer,
            period_years,
            cost,
            currency: currency.to_string(),
            event_time: effective_time,
            status: BillingStatus::Deferred,
        }
    }

    /// Gaining registrar's autorenew, starting at the transferred expiry
    pub fn deferred_autorenew(
        registrar_id: RegistrarId,
        resource_key: ResourceKey,
        transfer_id: TransferId,
        currency: &str,
        starts_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            registrar_id,
            resource_key,
            transfer_id,
            reason: BillingReason::Autorenew,
            period_years: 1,
            cost: Decimal::ZERO,
            currency: currency.to_string(),
            event_time: starts_at,
            status: BillingStatus::Deferred,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::billing_event(self.id)
    }

    /// Confirm the event. A transfer charge takes the completion time as
    /// its billing time; an autorenew keeps its start.
    pub fn mature(&mut self, effective_time: DateTime<Utc>) {
        if self.reason == BillingReason::Transfer {
            self.event_time = effective_time;
        }
        self.status = BillingStatus::Matured;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    PollMessage(PollMessage),
    BillingEvent(BillingEvent),
}

impl LedgerRecord {
    pub fn key(&self) -> EntityKey {
        match self {
            LedgerRecord::PollMessage(m) => m.key(),
            LedgerRecord::BillingEvent(e) => e.key(),
        }
    }
}

impl From<PollMessage> for LedgerRecord {
    fn from(m: PollMessage) -> Self {
        LedgerRecord::PollMessage(m)
    }
}

impl From<BillingEvent> for LedgerRecord {
    fn from(e: BillingEvent) -> Self {
        LedgerRecord::BillingEvent(e)
    }
}

// ============================================================================
// Diff -> Batch
// ============================================================================

/// Ledger changes requested by one transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerDiff {
    pub create: Vec<LedgerRecord>,
    pub delete: Vec<EntityKey>,
    /// Speculative billing events kept because the transfer completed
    pub mature: Vec<(EntityKey, DateTime<Utc>)>,
}

impl LedgerDiff {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty() && self.mature.is_empty()
    }

    pub fn poll_messages(&self) -> impl Iterator<Item = &PollMessage> {
        self.create.iter().filter_map(|r| match r {
            LedgerRecord::PollMessage(m) => Some(m),
            LedgerRecord::BillingEvent(_) => None,
        })
    }

    pub fn billing_events(&self) -> impl Iterator<Item = &BillingEvent> {
        self.create.iter().filter_map(|r| match r {
            LedgerRecord::BillingEvent(e) => Some(e),
            LedgerRecord::PollMessage(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerWrite {
    Delete(EntityKey),
    Mature {
        id: EntityId,
        effective_time: DateTime<Utc>,
    },
    Insert(LedgerRecord),
}

/// Checked, ordered writes: deletes, then matures, then inserts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerBatch {
    writes: Vec<LedgerWrite>,
}

impl LedgerBatch {
    pub fn writes(&self) -> &[LedgerWrite] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply to in-memory tables
    pub fn apply(&self, tables: &mut LedgerTables) -> LedgerOutcome {
        let mut outcome = LedgerOutcome::default();
        for write in &self.writes {
            match write {
                LedgerWrite::Delete(key) => {
                    if tables.remove(key) {
                        outcome.deleted += 1;
                    } else {
                        debug!(entity = %key, "Ledger delete skipped: already consumed");
                        outcome.missing += 1;
                    }
                }
                LedgerWrite::Mature { id, effective_time } => {
                    match tables.billing_events.get_mut(id) {
                        Some(event) => {
                            event.mature(*effective_time);
                            outcome.matured += 1;
                        }
                        None => {
                            warn!(billing_event = %id, "Ledger mature skipped: billing event missing");
                            outcome.missing += 1;
                        }
                    }
                }
                LedgerWrite::Insert(record) => {
                    tables.insert(record.clone());
                    outcome.inserted += 1;
                }
            }
        }
        outcome
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub inserted: usize,
    pub deleted: usize,
    pub matured: usize,
    /// Deletes or matures whose target was already gone
    pub missing: usize,
}

/// Owns the ledger invariants.
pub struct SideEffectLedger;

impl SideEffectLedger {
    pub fn materialize(diff: LedgerDiff) -> Result<LedgerBatch, TransferError> {
        let mut created = BTreeSet::new();
        let mut transfer_charges = BTreeSet::new();
        for record in &diff.create {
            if !created.insert(record.key()) {
                return Err(TransferError::Ledger(format!(
                    "duplicate create of {}",
                    record.key()
                )));
            }
            if let LedgerRecord::BillingEvent(event) = record
                && event.reason == BillingReason::Transfer
                && !transfer_charges.insert(event.transfer_id)
            {
                return Err(TransferError::Ledger(format!(
                    "second transfer billing event for transfer {}",
                    event.transfer_id
                )));
            }
        }

        let deleted: BTreeSet<EntityKey> = diff.delete.iter().copied().collect();
        let mut matured = BTreeSet::new();
        for (key, _) in &diff.mature {
            if key.kind != EntityKind::BillingEvent {
                return Err(TransferError::Ledger(format!("cannot mature {}", key)));
            }
            if deleted.contains(key) {
                return Err(TransferError::Ledger(format!(
                    "{} is both matured and deleted",
                    key
                )));
            }
            if !matured.insert(*key) {
                return Err(TransferError::Ledger(format!("{} matured twice", key)));
            }
        }
        if let Some(key) = deleted.iter().find(|k| created.contains(*k)) {
            return Err(TransferError::Ledger(format!(
                "{} is both created and deleted",
                key
            )));
        }

        let mut writes = Vec::with_capacity(deleted.len() + diff.mature.len() + diff.create.len());
        writes.extend(deleted.into_iter().map(LedgerWrite::Delete));
        writes.extend(diff.mature.into_iter().map(|(key, effective_time)| {
            LedgerWrite::Mature {
                id: key.id,
                effective_time,
            }
        }));
        writes.extend(diff.create.into_iter().map(LedgerWrite::Insert));

        Ok(LedgerBatch { writes })
    }
}

// ============================================================================
// In-memory tables
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LedgerTables {
    pub poll_messages: BTreeMap<EntityId, PollMessage>,
    pub billing_events: BTreeMap<EntityId, BillingEvent>,
}

impl LedgerTables {
    fn insert(&mut self, record: LedgerRecord) {
        match record {
            LedgerRecord::PollMessage(m) => {
                self.poll_messages.insert(m.id, m);
            }
            LedgerRecord::BillingEvent(e) => {
                self.billing_events.insert(e.id, e);
            }
        }
    }

    fn remove(&mut self, key: &EntityKey) -> bool {
        match key.kind {
            EntityKind::PollMessage => self.poll_messages.remove(&key.id).is_some(),
            EntityKind::BillingEvent => self.billing_events.remove(&key.id).is_some(),
        }
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        match key.kind {
            EntityKind::PollMessage => self.poll_messages.contains_key(&key.id),
            EntityKind::BillingEvent => self.billing_events.contains_key(&key.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::status::TransferStatus;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn key() -> ResourceKey {
        ResourceKey::domain("example.tld")
    }

    fn charge(transfer_id: TransferId) -> BillingEvent {
        BillingEvent::deferred_transfer(
            "registrar-a".into(),
            key(),
            transfer_id,
            1,
            Decimal::new(800, 2),
            "USD",
            t0(),
        )
    }

    fn notice(registrar: &str) -> PollMessage {
        let payload = TransferResponse {
            resource_id: "example.tld".to_string(),
            transfer_id: Some(TransferId::new()),
            status: TransferStatus::Pending,
            gaining_registrar_id: Some("registrar-a".into()),
            losing_registrar_id: Some("registrar-b".into()),
            request_time: Some(t0()),
            action_time: Some(t0()),
            extended_expiration_time: None,
        };
        PollMessage::new(registrar.into(), key(), t0(), payload)
    }

    #[test]
    fn test_batch_orders_deletes_first() {
        let doomed = EntityKey::poll_message(EntityId::new());
        let diff = LedgerDiff {
            create: vec![notice("registrar-a").into()],
            delete: vec![doomed],
            mature: vec![],
        };
        let batch = SideEffectLedger::materialize(diff).unwrap();
        assert!(matches!(batch.writes()[0], LedgerWrite::Delete(k) if k == doomed));
        assert!(matches!(batch.writes()[1], LedgerWrite::Insert(_)));
    }

    #[test]
    fn test_rejects_second_transfer_charge() {
        let transfer_id = TransferId::new();
        let diff = LedgerDiff {
            create: vec![charge(transfer_id).into(), charge(transfer_id).into()],
            ..Default::default()
        };
        let err = SideEffectLedger::materialize(diff).unwrap_err();
        assert!(matches!(err, TransferError::Ledger(_)));
    }

    #[test]
    fn test_rejects_mature_and_delete_of_same_record() {
        let event = charge(TransferId::new());
        let diff = LedgerDiff {
            delete: vec![event.key()],
            mature: vec![(event.key(), t0())],
            ..Default::default()
        };
        assert!(SideEffectLedger::materialize(diff).is_err());
    }

    #[test]
    fn test_rejects_mature_of_poll_message() {
        let diff = LedgerDiff {
            mature: vec![(EntityKey::poll_message(EntityId::new()), t0())],
            ..Default::default()
        };
        assert!(SideEffectLedger::materialize(diff).is_err());
    }

    #[test]
    fn test_duplicate_deletes_collapse() {
        let doomed = EntityKey::billing_event(EntityId::new());
        let diff = LedgerDiff {
            delete: vec![doomed, doomed],
            ..Default::default()
        };
        let batch = SideEffectLedger::materialize(diff).unwrap();
        assert_eq!(batch.writes().len(), 1);
    }

    #[test]
    fn test_apply_counts_missing_deletes() {
        let mut tables = LedgerTables::default();
        let event = charge(TransferId::new());
        let message = notice("registrar-b");
        tables.insert(event.clone().into());
        tables.insert(message.clone().into());

        let diff = LedgerDiff {
            delete: vec![message.key(), EntityKey::poll_message(EntityId::new())],
            mature: vec![(event.key(), t0() + chrono::Duration::days(5))],
            ..Default::default()
        };
        let outcome = SideEffectLedger::materialize(diff).unwrap().apply(&mut tables);

        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.missing, 1);
        assert_eq!(outcome.matured, 1);
        assert!(!tables.contains(&message.key()));

        let matured = &tables.billing_events[&event.id];
        assert_eq!(matured.status, BillingStatus::Matured);
        assert_eq!(matured.event_time, t0() + chrono::Duration::days(5));
    }

    #[test]
    fn test_autorenew_keeps_start_when_matured() {
        let mut renew = BillingEvent::deferred_autorenew(
            "registrar-a".into(),
            key(),
            TransferId::new(),
            "USD",
            t0(),
        );
        renew.mature(t0() + chrono::Duration::days(5));
        assert_eq!(renew.event_time, t0());
        assert_eq!(renew.status, BillingStatus::Matured);
    }

    #[test]
    fn test_poll_message_delivery_time() {
        let message = notice("registrar-b");
        assert!(message.is_deliverable(t0()));
        assert!(!message.is_deliverable(t0() - chrono::Duration::seconds(1)));
        assert_eq!(message.message, "Transfer requested.");
    }
}
