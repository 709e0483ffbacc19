//! Transfer Status Definitions
//!
//! Status IDs are stable for PostgreSQL storage as SMALLINT.
//! Names match the EPP `trStatus` values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transfer status
///
/// ```text
///                 ┌──▶ CLIENT_APPROVED
///                 ├──▶ CLIENT_REJECTED
/// NONE ──▶ PENDING┼──▶ CLIENT_CANCELLED
///                 ├──▶ SERVER_APPROVED   (window elapsed)
///                 └──▶ SERVER_CANCELLED  (registry action)
/// ```
///
/// Any resolved status may go back to PENDING only through a new request,
/// which replaces the whole transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(i16)]
pub enum TransferStatus {
    /// Never transferred
    None = 0,

    /// Awaiting action by the losing registrar
    Pending = 10,

    /// Approved by the losing registrar
    ClientApproved = 20,

    /// Rejected by the losing registrar
    ClientRejected = -10,

    /// Withdrawn by the gaining registrar
    ClientCancelled = -20,

    /// Approved automatically when the pending window elapsed
    ServerApproved = 30,

    /// Cancelled by the registry
    ServerCancelled = -30,

    /// Resource is pending delete; no transfer can proceed
    PendingDelete = -40,
}

impl TransferStatus {
    /// Resolved statuses: the attempt is over and no longer tracks
    /// speculative records.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::None | TransferStatus::Pending)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, TransferStatus::Pending)
    }

    /// Whether sponsorship moved to the gaining registrar
    #[inline]
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            TransferStatus::ClientApproved | TransferStatus::ServerApproved
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::None),
            10 => Some(TransferStatus::Pending),
            20 => Some(TransferStatus::ClientApproved),
            -10 => Some(TransferStatus::ClientRejected),
            -20 => Some(TransferStatus::ClientCancelled),
            30 => Some(TransferStatus::ServerApproved),
            -30 => Some(TransferStatus::ServerCancelled),
            -40 => Some(TransferStatus::PendingDelete),
            _ => None,
        }
    }

    /// EPP `trStatus` value
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::None => "none",
            TransferStatus::Pending => "pending",
            TransferStatus::ClientApproved => "clientApproved",
            TransferStatus::ClientRejected => "clientRejected",
            TransferStatus::ClientCancelled => "clientCancelled",
            TransferStatus::ServerApproved => "serverApproved",
            TransferStatus::ServerCancelled => "serverCancelled",
            TransferStatus::PendingDelete => "pendingDelete",
        }
    }

    /// Text placed in the poll message announcing this status
    pub fn message(&self) -> &'static str {
        match self {
            TransferStatus::None => "No transfer.",
            TransferStatus::Pending => "Transfer requested.",
            TransferStatus::ClientApproved => "Transfer approved.",
            TransferStatus::ClientRejected => "Transfer rejected.",
            TransferStatus::ClientCancelled => "Transfer cancelled.",
            TransferStatus::ServerApproved => "Transfer approved.",
            TransferStatus::ServerCancelled => "Transfer cancelled.",
            TransferStatus::PendingDelete => "Transfer cancelled; object pending delete.",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}
