//! Transfer Error Types
//!
//! Every variant is terminal to the single command and never fatal to the
//! process. `epp_code()` gives the EPP result code the protocol layer
//! reports for it.

use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Session / Authorization ===
    #[error("Registrar is not logged in")]
    NotLoggedIn,

    #[error("Registrar is not authorized to act on this transfer")]
    NotAuthorized,

    #[error("Registrar is not the initiator of this transfer")]
    NotTransferInitiator,

    #[error("Authorization information for accessing resource is invalid")]
    BadAuthInfo,

    // === Resource ===
    #[error("Resource with this id does not exist: {0}")]
    ResourceNotFound(String),

    #[error("Registrar already sponsors this resource")]
    ObjectAlreadySponsored,

    #[error("Resource is not eligible for transfer: {0}")]
    NotEligibleForTransfer(String),

    #[error("Transfer period must be {expected} year(s), got {requested}")]
    InvalidTransferPeriod { requested: u32, expected: u32 },

    // === Transfer Status ===
    #[error("Resource is already pending transfer: {0}")]
    AlreadyPendingTransfer(String),

    #[error("Resource is not pending transfer: {0}")]
    NotPendingTransfer(String),

    #[error("Resource has no transfer history: {0}")]
    NoTransferHistory(String),

    // === System ===
    #[error("Invalid transfer data: {0}")]
    InvalidTransferData(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transient failure, retries exhausted: {0}")]
    TransientFailure(String),
}

impl TransferError {
    /// Stable error code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::NotLoggedIn => "NOT_LOGGED_IN",
            TransferError::NotAuthorized => "NOT_AUTHORIZED",
            TransferError::NotTransferInitiator => "NOT_TRANSFER_INITIATOR",
            TransferError::BadAuthInfo => "BAD_AUTH_INFO",
            TransferError::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            TransferError::ObjectAlreadySponsored => "OBJECT_ALREADY_SPONSORED",
            TransferError::NotEligibleForTransfer(_) => "NOT_ELIGIBLE_FOR_TRANSFER",
            TransferError::InvalidTransferPeriod { .. } => "INVALID_TRANSFER_PERIOD",
            TransferError::AlreadyPendingTransfer(_) => "ALREADY_PENDING_TRANSFER",
            TransferError::NotPendingTransfer(_) => "NOT_PENDING_TRANSFER",
            TransferError::NoTransferHistory(_) => "NO_TRANSFER_HISTORY",
            TransferError::InvalidTransferData(_) => "INVALID_TRANSFER_DATA",
            TransferError::Ledger(_) => "LEDGER_ERROR",
            TransferError::Database(_) => "DATABASE_ERROR",
            TransferError::TransientFailure(_) => "TRANSIENT_FAILURE",
        }
    }

    /// EPP result code (RFC 5730 §3)
    pub fn epp_code(&self) -> u16 {
        match self {
            TransferError::NotLoggedIn
            | TransferError::ObjectAlreadySponsored
            | TransferError::NoTransferHistory(_) => 2002,
            TransferError::NotAuthorized | TransferError::NotTransferInitiator => 2201,
            TransferError::BadAuthInfo => 2202,
            TransferError::AlreadyPendingTransfer(_) => 2300,
            TransferError::NotPendingTransfer(_) => 2301,
            TransferError::ResourceNotFound(_) => 2303,
            TransferError::NotEligibleForTransfer(_) => 2304,
            TransferError::InvalidTransferPeriod { .. } => 2306,
            TransferError::InvalidTransferData(_)
            | TransferError::Ledger(_)
            | TransferError::Database(_)
            | TransferError::TransientFailure(_) => 2400,
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) | StoreError::Unavailable(_) => {
                TransferError::TransientFailure(e.to_string())
            }
            StoreError::Database(_) | StoreError::Corrupt(_) => {
                TransferError::Database(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransferError::NotTransferInitiator.code(),
            "NOT_TRANSFER_INITIATOR"
        );
        assert_eq!(
            TransferError::NotPendingTransfer("x".into()).code(),
            "NOT_PENDING_TRANSFER"
        );
        assert_eq!(TransferError::BadAuthInfo.code(), "BAD_AUTH_INFO");
    }

    #[test]
    fn test_epp_codes() {
        assert_eq!(TransferError::AlreadyPendingTransfer("x".into()).epp_code(), 2300);
        assert_eq!(TransferError::NotPendingTransfer("x".into()).epp_code(), 2301);
        assert_eq!(TransferError::NotTransferInitiator.epp_code(), 2201);
        assert_eq!(TransferError::BadAuthInfo.epp_code(), 2202);
        assert_eq!(TransferError::ResourceNotFound("x".into()).epp_code(), 2303);
        assert_eq!(TransferError::TransientFailure("x".into()).epp_code(), 2400);
    }

    #[test]
    fn test_store_error_conversion() {
        let err: TransferError = StoreError::Conflict("version".into()).into();
        assert!(matches!(err, TransferError::TransientFailure(_)));
        assert_eq!(err.epp_code(), 2400);

        let err: TransferError = StoreError::Corrupt("bad row".into()).into();
        assert!(matches!(err, TransferError::Database(_)));
    }

    #[test]
    fn test_display() {
        let err = TransferError::NotPendingTransfer("domain/example.tld".into());
        assert_eq!(
            err.to_string(),
            "Resource is not pending transfer: domain/example.tld"
        );
    }
}
