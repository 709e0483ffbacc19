//! Registry Transfer Lifecycle
//!
//! EPP transfer of sponsorship of a domain or contact from a losing
//! registrar to a gaining registrar.
//!
//! # State Machine
//!
//! ```text
//!                 ┌──▶ CLIENT_APPROVED   (losing registrar approves)
//!                 ├──▶ CLIENT_REJECTED   (losing registrar rejects)
//! NONE ──▶ PENDING ┼──▶ CLIENT_CANCELLED  (gaining registrar cancels)
//!   ▲             ├──▶ SERVER_APPROVED   (window elapsed, scheduler)
//!   │             └──▶ SERVER_CANCELLED  (registry)
//!   └──── any terminal status: a new request starts a new attempt
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Single pending attempt**: a resource has at most one PENDING
//!    transfer at any instant
//! 2. **One resolution**: of several racing resolutions exactly one commits;
//!    every other caller reloads and gets `NotPendingTransfer`
//! 3. **All or nothing**: resource, transfer data, ledger writes and history
//!    commit in one transaction
//! 4. **Explicit time**: every decision is made against a `now` read once
//!    per attempt

pub mod auth;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod flow;
pub mod history;
pub mod ledger;
pub mod resource;
pub mod scheduler;
pub mod status;
pub mod store;


// Re-exports for convenience
pub use auth::{AuthInfoVerifier, ResourceAuthInfoVerifier, SessionContext};
pub use data::{TransferAttempt, TransferData, TransferResponse};
pub use error::TransferError;
pub use evaluator::{Evaluation, TransferCommand, TransferEvaluator};
pub use flow::{AutoApproveOutcome, TransferFlow};
pub use history::{HistoryEntry, HistoryType};
pub use ledger::{BillingEvent, LedgerBatch, LedgerDiff, PollMessage, SideEffectLedger};
pub use resource::{Contact, Domain, ExpiryStrategy, Resource, ResourceStatus, TransferableResource};
pub use scheduler::{AutoApprovalScheduler, ScanReport};
pub use status::TransferStatus;
pub use store::{MemoryTransferStore, PgTransferStore, StoreError, TransferCommit, TransferStore};
