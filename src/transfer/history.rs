//! Audit history written alongside every committed transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{EntityId, RegistrarId, ResourceKey, ResourceKind, TransferId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryType {
    TransferRequest,
    TransferApprove,
    TransferReject,
    TransferCancel,
    TransferServerApprove,
    TransferServerCancel,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryType::TransferRequest => "TRANSFER_REQUEST",
            HistoryType::TransferApprove => "TRANSFER_APPROVE",
            HistoryType::TransferReject => "TRANSFER_REJECT",
            HistoryType::TransferCancel => "TRANSFER_CANCEL",
            HistoryType::TransferServerApprove => "TRANSFER_SERVER_APPROVE",
            HistoryType::TransferServerCancel => "TRANSFER_SERVER_CANCEL",
        }
    }

    /// Resource-qualified label, e.g. `DOMAIN_TRANSFER_CANCEL`
    pub fn label(&self, kind: ResourceKind) -> String {
        format!("{}_{}", kind.as_str().to_ascii_uppercase(), self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: EntityId,
    pub resource_key: ResourceKey,
    pub history_type: HistoryType,
    /// Registrar on whose behalf the change was made
    pub registrar_id: RegistrarId,
    pub transfer_id: TransferId,
    pub modification_time: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        resource_key: ResourceKey,
        history_type: HistoryType,
        registrar_id: RegistrarId,
        transfer_id: TransferId,
        modification_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            resource_key,
            history_type,
            registrar_id,
            transfer_id,
            modification_time,
        }
    }
}
