//! Registry Transfer
//!
//! Transfer lifecycle for EPP registry resources: request, approve, reject,
//! cancel, query and automatic approval when the losing registrar does not
//! respond in time.
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers (RegistrarId, ResourceKey, TransferId, EntityKey)
//! - [`clock`] - Time source threaded through every decision
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`transfer`] - Transfer state, evaluation, ledger, store, flow and scheduler

// Core types - must be first!
pub mod core_types;

pub mod clock;
pub mod config;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use core_types::{EntityId, EntityKey, RegistrarId, ResourceKey, ResourceKind, TransferId};
pub use transfer::{
    AutoApprovalScheduler, TransferError, TransferFlow, TransferResponse, TransferStatus,
};
