//! Auto-Approval Scheduler
//!
//! Background task that server-approves pending transfers whose response
//! window has elapsed. The trigger is the persisted pending expiration
//! time, so a restart loses nothing: the next scan finds every transfer
//! that fell due while the process was down.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::flow::{AutoApproveOutcome, TransferFlow};
use crate::config::SchedulerConfig;
use crate::core_types::ResourceKey;

/// A transfer the scheduler gave up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkedTransfer {
    pub attempts: u32,
    pub last_error: String,
    pub parked_at: DateTime<Utc>,
}

/// Counts for one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub due: usize,
    pub approved: usize,
    pub already_resolved: usize,
    pub not_due: usize,
    pub parked: usize,
}

pub struct AutoApprovalScheduler {
    flow: Arc<TransferFlow>,
    config: SchedulerConfig,
    parked: DashMap<ResourceKey, ParkedTransfer>,
}

impl AutoApprovalScheduler {
    pub fn new(flow: Arc<TransferFlow>, config: SchedulerConfig) -> Self {
        Self {
            flow,
            config,
            parked: DashMap::new(),
        }
    }

    /// Run the scan loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval_secs,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "Starting auto-approval scheduler"
        );

        loop {
            let now = self.flow.clock().now();
            if let Err(e) = self.scan_and_approve(now).await {
                error!(error = %e, code = e.code(), "Auto-approval scan failed");
            }

            tokio::time::sleep(self.config.scan_interval()).await;
        }
    }

    /// Fire every transfer due at `now`, up to one batch
    pub async fn scan_and_approve(&self, now: DateTime<Utc>) -> Result<ScanReport, TransferError> {
        // Parked keys stay pending in the store; ask for enough to skip them
        let limit = self.config.batch_size + self.parked.len();
        let due: Vec<ResourceKey> = self
            .flow
            .store()
            .find_due_transfers(now, limit)
            .await?
            .into_iter()
            .filter(|key| !self.parked.contains_key(key))
            .take(self.config.batch_size)
            .collect();

        let mut report = ScanReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!(now = %now, "No transfers due for automatic approval");
            return Ok(report);
        }
        info!(count = due.len(), "Found transfers due for automatic approval");

        for key in &due {
            match self.fire(key).await {
                Ok(AutoApproveOutcome::Approved(response)) => {
                    info!(
                        resource = %key,
                        transfer_id = ?response.transfer_id,
                        status = %response.status,
                        "Transfer server approved"
                    );
                    report.approved += 1;
                }
                Ok(AutoApproveOutcome::AlreadyResolved) => {
                    debug!(resource = %key, "Transfer already resolved");
                    report.already_resolved += 1;
                }
                Ok(AutoApproveOutcome::NotDue) => {
                    debug!(resource = %key, "Transfer not yet due");
                    report.not_due += 1;
                }
                Err(_) => report.parked += 1,
            }
        }

        Ok(report)
    }

    /// Fire one transfer with bounded exponential backoff. Only transient
    /// failures are retried; anything else, or a transient failure that
    /// outlasts the retries, parks the key.
    pub async fn fire(&self, key: &ResourceKey) -> Result<AutoApproveOutcome, TransferError> {
        let max_retries = self.config.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.flow.auto_approve(key).await {
                Ok(outcome) => return Ok(outcome),
                Err(e @ TransferError::TransientFailure(_)) if attempt < max_retries => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        resource = %key,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Automatic approval failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        resource = %key,
                        attempts = attempt,
                        code = e.code(),
                        error = %e,
                        "Automatic approval abandoned, requires operator intervention"
                    );
                    self.parked.insert(
                        key.clone(),
                        ParkedTransfer {
                            attempts: attempt,
                            last_error: e.to_string(),
                            parked_at: self.flow.clock().now(),
                        },
                    );
                    return Err(e);
                }
            }
        }
    }

    pub fn parked(&self, key: &ResourceKey) -> Option<ParkedTransfer> {
        self.parked.get(key).map(|entry| entry.value().clone())
    }

    pub fn parked_keys(&self) -> Vec<ResourceKey> {
        self.parked.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Return a parked transfer to the scan after an operator has dealt
    /// with it
    pub fn release(&self, key: &ResourceKey) -> bool {
        let released = self.parked.remove(key).is_some();
        if released {
            info!(resource = %key, "Parked transfer released");
        }
        released
    }
}
