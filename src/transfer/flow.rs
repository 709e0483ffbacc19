//! Transfer Flow
//!
//! Drives one command end to end: session check, load, auth-info check,
//! evaluation, ledger materialization and an atomic versioned commit.
//! A commit that loses a race is retried from a fresh load, so the loser
//! sees the winner's state and fails with the domain error it implies.

use std::sync::Arc;
use tracing::{info, warn};

use super::auth::{AuthInfoVerifier, SessionContext};
use super::data::TransferResponse;
use super::error::TransferError;
use super::evaluator::{TransferCommand, TransferEvaluator};
use super::history::HistoryEntry;
use super::ledger::{PollMessage, SideEffectLedger};
use super::resource::{Resource, TransferableResource};
use super::store::{StoreError, TransferCommit, TransferStore};
use crate::clock::Clock;
use crate::config::{FlowConfig, TransferConfig};
use crate::core_types::{RegistrarId, ResourceKey};

/// Who a transition is performed for
#[derive(Debug, Clone, Copy)]
enum Actor<'a> {
    Registrar(&'a RegistrarId),
    /// The registry itself; recorded against the losing registrar
    Server,
}

/// Result of an automatic approval firing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoApproveOutcome {
    Approved(TransferResponse),
    /// Window still open at the time of firing
    NotDue,
    /// Resolved by someone else first
    AlreadyResolved,
}

pub struct TransferFlow {
    store: Arc<dyn TransferStore>,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn AuthInfoVerifier>,
    evaluator: TransferEvaluator,
    retry: FlowConfig,
}

impl TransferFlow {
    pub fn new(
        store: Arc<dyn TransferStore>,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn AuthInfoVerifier>,
        policy: TransferConfig,
        retry: FlowConfig,
    ) -> Self {
        Self {
            store,
            clock,
            verifier,
            evaluator: TransferEvaluator::new(policy),
            retry,
        }
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run a registrar-issued command
    pub async fn execute(
        &self,
        session: &SessionContext,
        key: &ResourceKey,
        command: TransferCommand,
        auth_info: Option<&str>,
    ) -> Result<TransferResponse, TransferError> {
        let acting = session.require_registrar()?;
        if command.is_server_initiated() {
            return Err(TransferError::NotAuthorized);
        }
        let stored = self
            .transition(key, Actor::Registrar(acting), command, auth_info)
            .await?;
        Ok(TransferResponse::new(stored.key(), stored.transfer_data()))
    }

    pub async fn request(
        &self,
        session: &SessionContext,
        key: &ResourceKey,
        period_years: Option<u32>,
        auth_info: Option<&str>,
    ) -> Result<TransferResponse, TransferError> {
        self.execute(
            session,
            key,
            TransferCommand::Request { period_years },
            auth_info,
        )
        .await
    }

    pub async fn approve(
        &self,
        session: &SessionContext,
        key: &ResourceKey,
        auth_info: Option<&str>,
    ) -> Result<TransferResponse, TransferError> {
        self.execute(session, key, TransferCommand::Approve, auth_info)
            .await
    }

    pub async fn reject(
        &self,
        session: &SessionContext,
        key: &ResourceKey,
        auth_info: Option<&str>,
    ) -> Result<TransferResponse, TransferError> {
        self.execute(session, key, TransferCommand::Reject, auth_info)
            .await
    }

    pub async fn cancel(
        &self,
        session: &SessionContext,
        key: &ResourceKey,
        auth_info: Option<&str>,
    ) -> Result<TransferResponse, TransferError> {
        self.execute(session, key, TransferCommand::Cancel, auth_info)
            .await
    }

    /// Read-only transfer status
    pub async fn query(
        &self,
        session: &SessionContext,
        key: &ResourceKey,
        auth_info: Option<&str>,
    ) -> Result<TransferResponse, TransferError> {
        let acting = session.require_registrar()?;
        let resource = self.load_active(key).await?;
        let verified = self.check_auth_info(&resource, auth_info)?;
        self.evaluator
            .query(&resource, acting, verified, self.clock.now())
    }

    /// Registrar mailbox as of now
    pub async fn poll(&self, session: &SessionContext) -> Result<Vec<PollMessage>, TransferError> {
        let registrar = session.require_registrar()?;
        Ok(self
            .store
            .poll_messages_for(registrar, self.clock.now())
            .await?)
    }

    /// Administrative cancellation of a pending transfer
    pub async fn server_cancel(&self, key: &ResourceKey) -> Result<TransferResponse, TransferError> {
        let stored = self
            .transition(key, Actor::Server, TransferCommand::ServerCancel, None)
            .await?;
        Ok(TransferResponse::new(stored.key(), stored.transfer_data()))
    }

    /// Approve a transfer whose response window has elapsed. Safe to fire
    /// more than once or after an explicit resolution.
    pub async fn auto_approve(&self, key: &ResourceKey) -> Result<AutoApproveOutcome, TransferError> {
        match self
            .transition(key, Actor::Server, TransferCommand::ServerApprove, None)
            .await
        {
            Ok(stored) => Ok(AutoApproveOutcome::Approved(TransferResponse::new(
                stored.key(),
                stored.transfer_data(),
            ))),
            Err(TransferError::NotPendingTransfer(_)) => Ok(AutoApproveOutcome::AlreadyResolved),
            Err(TransferError::NotEligibleForTransfer(_)) => Ok(AutoApproveOutcome::NotDue),
            Err(e) => Err(e),
        }
    }

    async fn load_active(&self, key: &ResourceKey) -> Result<Resource, TransferError> {
        let now = self.clock.now();
        self.store
            .load_resource(key)
            .await?
            .filter(|r| r.is_active(now))
            .ok_or_else(|| TransferError::ResourceNotFound(key.to_string()))
    }

    /// `Ok(true)` when a token was presented and matches
    fn check_auth_info(
        &self,
        resource: &Resource,
        auth_info: Option<&str>,
    ) -> Result<bool, TransferError> {
        match auth_info {
            None => Ok(false),
            Some(token) if self.verifier.verify(token, resource) => Ok(true),
            Some(_) => Err(TransferError::BadAuthInfo),
        }
    }

    async fn transition(
        &self,
        key: &ResourceKey,
        actor: Actor<'_>,
        command: TransferCommand,
        auth_info: Option<&str>,
    ) -> Result<Resource, TransferError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<StoreError> = None;

        for attempt in 1..=max_attempts {
            let now = self.clock.now();
            let resource = match self.store.load_resource(key).await {
                Ok(Some(r)) if r.is_active(now) => r,
                Ok(_) => return Err(TransferError::ResourceNotFound(key.to_string())),
                Err(e) if e.is_retryable() => {
                    last_error = Some(e);
                    self.backoff(key, attempt, last_error.as_ref()).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.check_auth_info(&resource, auth_info)?;

            let acting = match actor {
                Actor::Registrar(registrar) => registrar.clone(),
                Actor::Server => resource
                    .transfer_data()
                    .attempt()
                    .map(|a| a.losing_registrar_id.clone())
                    .unwrap_or_else(|| resource.sponsor().clone()),
            };

            let strategy = self.evaluator.strategy_for(&resource);
            let evaluation = self
                .evaluator
                .evaluate(&resource, command, &acting, now, strategy)?;
            let status = evaluation.status();
            let transfer_id = evaluation.transfer_id;
            let batch = SideEffectLedger::materialize(evaluation.diff)?;
            let history = HistoryEntry::new(
                key.clone(),
                evaluation.history_type,
                acting.clone(),
                transfer_id,
                now,
            );

            let commit = TransferCommit {
                resource: evaluation.resource,
                expected_version: resource.version(),
                batch,
                history,
            };
            match self.store.commit(commit).await {
                Ok(stored) => {
                    info!(
                        resource = %key,
                        transfer_id = %transfer_id,
                        status = %status,
                        registrar = %acting,
                        attempt = attempt,
                        "Transfer transition committed"
                    );
                    return Ok(stored);
                }
                Err(e) if e.is_retryable() => {
                    last_error = Some(e);
                    self.backoff(key, attempt, last_error.as_ref()).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TransferError::TransientFailure(format!(
            "{} after {} attempts: {}",
            key,
            max_attempts,
            last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
        )))
    }

    async fn backoff(&self, key: &ResourceKey, attempt: u32, error: Option<&StoreError>) {
        warn!(
            resource = %key,
            attempt = attempt,
            error = ?error,
            "Transfer commit failed, retrying"
        );
        if attempt < self.retry.max_attempts {
            tokio::time::sleep(self.retry.retry_backoff() * attempt).await;
        }
    }
}
