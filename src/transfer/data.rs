//! Transfer Data
//!
//! Immutable snapshot of a resource's most recent transfer attempt. A
//! transition never edits an attempt in place: it builds the next snapshot
//! and hands it back to the resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::error::TransferError;
use super::status::TransferStatus;
use crate::core_types::{EntityKey, RegistrarId, ResourceKey, TransferId};

/// Transfer state of a resource: nothing yet, or the latest attempt
/// (pending or resolved).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TransferData {
    #[default]
    None,
    Attempt(TransferAttempt),
}

/// One transfer attempt. Both parties are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAttempt {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
    pub gaining_registrar_id: RegistrarId,
    pub losing_registrar_id: RegistrarId,
    pub request_time: DateTime<Utc>,
    /// request_time + automatic transfer length
    pub pending_expiration_time: DateTime<Utc>,
    /// Records created at request time on the assumption that the transfer
    /// will be server approved. Emptied on resolution.
    #[serde(default)]
    pub server_approve_entities: BTreeSet<EntityKey>,
    /// New registration expiry if the transfer completes (domains only)
    #[serde(default)]
    pub transferred_registration_expiration_time: Option<DateTime<Utc>>,
    /// When the attempt left PENDING
    #[serde(default)]
    pub resolution_time: Option<DateTime<Utc>>,
}

impl TransferAttempt {
    /// Build the resolved snapshot of this attempt.
    pub fn resolve(&self, status: TransferStatus, now: DateTime<Utc>) -> TransferAttempt {
        TransferAttempt {
            status,
            server_approve_entities: BTreeSet::new(),
            resolution_time: Some(now),
            ..self.clone()
        }
    }

    /// Whether the response window has elapsed at `now`
    #[inline]
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.pending_expiration_time
    }

    pub fn is_party(&self, registrar: &RegistrarId) -> bool {
        &self.gaining_registrar_id == registrar || &self.losing_registrar_id == registrar
    }
}

impl TransferData {
    pub fn status(&self) -> TransferStatus {
        match self {
            TransferData::None => TransferStatus::None,
            TransferData::Attempt(attempt) => attempt.status,
        }
    }

    pub fn attempt(&self) -> Option<&TransferAttempt> {
        match self {
            TransferData::None => None,
            TransferData::Attempt(attempt) => Some(attempt),
        }
    }

    /// The attempt, only if it is still pending
    pub fn pending(&self) -> Option<&TransferAttempt> {
        self.attempt().filter(|a| a.status.is_pending())
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status().is_pending()
    }

    pub fn server_approve_entities(&self) -> impl Iterator<Item = &EntityKey> {
        self.attempt()
            .into_iter()
            .flat_map(|a| a.server_approve_entities.iter())
    }

    /// Check the structural invariants of a snapshot.
    pub fn validate(&self) -> Result<(), TransferError> {
        let attempt = match self {
            TransferData::None => return Ok(()),
            TransferData::Attempt(attempt) => attempt,
        };

        if attempt.status == TransferStatus::None {
            return Err(TransferError::InvalidTransferData(
                "attempt cannot have status none".to_string(),
            ));
        }
        if attempt.gaining_registrar_id == attempt.losing_registrar_id {
            return Err(TransferError::InvalidTransferData(format!(
                "gaining and losing registrar are both {}",
                attempt.gaining_registrar_id
            )));
        }
        if attempt.pending_expiration_time <= attempt.request_time {
            return Err(TransferError::InvalidTransferData(
                "pending expiration must be after request time".to_string(),
            ));
        }
        if attempt.status.is_pending() && attempt.server_approve_entities.is_empty() {
            return Err(TransferError::InvalidTransferData(
                "pending transfer has no server approve entities".to_string(),
            ));
        }
        if attempt.status.is_terminal() && !attempt.server_approve_entities.is_empty() {
            return Err(TransferError::InvalidTransferData(format!(
                "{} transfer still holds {} server approve entities",
                attempt.status,
                attempt.server_approve_entities.len()
            )));
        }
        Ok(())
    }
}

/// Transfer data as reported to registrars, in command responses and
/// poll message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub resource_id: String,
    pub transfer_id: Option<TransferId>,
    pub status: TransferStatus,
    pub gaining_registrar_id: Option<RegistrarId>,
    pub losing_registrar_id: Option<RegistrarId>,
    pub request_time: Option<DateTime<Utc>>,
    /// Action date: pending expiration while pending, resolution time after
    pub action_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_expiration_time: Option<DateTime<Utc>>,
}

impl TransferResponse {
    pub fn new(key: &ResourceKey, data: &TransferData) -> Self {
        match data.attempt() {
            None => Self {
                resource_id: key.id.clone(),
                transfer_id: None,
                status: TransferStatus::None,
                gaining_registrar_id: None,
                losing_registrar_id: None,
                request_time: None,
                action_time: None,
                extended_expiration_time: None,
            },
            Some(attempt) => Self {
                resource_id: key.id.clone(),
                transfer_id: Some(attempt.transfer_id),
                status: attempt.status,
                gaining_registrar_id: Some(attempt.gaining_registrar_id.clone()),
                losing_registrar_id: Some(attempt.losing_registrar_id.clone()),
                request_time: Some(attempt.request_time),
                action_time: Some(
                    attempt
                        .resolution_time
                        .unwrap_or(attempt.pending_expiration_time),
                ),
                extended_expiration_time: attempt.transferred_registration_expiration_time,
            },
        }
    }
}
