//! Transfer Request Evaluator
//!
//! Pure decision logic: given a resource, a command, the acting registrar
//! and `now`, compute the next resource state and the ledger diff. Nothing
//! here touches the store, so every rule is testable without one.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use super::data::{TransferAttempt, TransferData, TransferResponse};
use super::error::TransferError;
use super::history::HistoryType;
use super::ledger::{BillingEvent, LedgerDiff, LedgerRecord, PollMessage};
use super::resource::{ExpiryStrategy, TransferableResource};
use super::status::TransferStatus;
use crate::config::TransferConfig;
use crate::core_types::{EntityKey, EntityKind, RegistrarId, TransferId};

/// Mutating transfer commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCommand {
    /// Gaining registrar asks for the resource
    Request { period_years: Option<u32> },
    /// Losing registrar accepts
    Approve,
    /// Losing registrar refuses
    Reject,
    /// Gaining registrar withdraws its request
    Cancel,
    /// Response window elapsed with no action
    ServerApprove,
    /// Registry ends a pending transfer
    ServerCancel,
}

impl TransferCommand {
    pub fn history_type(&self) -> HistoryType {
        match self {
            TransferCommand::Request { .. } => HistoryType::TransferRequest,
            TransferCommand::Approve => HistoryType::TransferApprove,
            TransferCommand::Reject => HistoryType::TransferReject,
            TransferCommand::Cancel => HistoryType::TransferCancel,
            TransferCommand::ServerApprove => HistoryType::TransferServerApprove,
            TransferCommand::ServerCancel => HistoryType::TransferServerCancel,
        }
    }

    pub fn is_server_initiated(&self) -> bool {
        matches!(
            self,
            TransferCommand::ServerApprove | TransferCommand::ServerCancel
        )
    }
}

/// Result of a successful evaluation
#[derive(Debug, Clone)]
pub struct Evaluation<R> {
    pub resource: R,
    pub diff: LedgerDiff,
    pub history_type: HistoryType,
    pub transfer_id: TransferId,
}

impl<R: TransferableResource> Evaluation<R> {
    pub fn status(&self) -> TransferStatus {
        self.resource.transfer_data().status()
    }

    pub fn response(&self) -> TransferResponse {
        TransferResponse::new(self.resource.key(), self.resource.transfer_data())
    }
}

pub struct TransferEvaluator {
    policy: TransferConfig,
}

impl TransferEvaluator {
    pub fn new(policy: TransferConfig) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TransferConfig {
        &self.policy
    }

    /// Expiry strategy for `resource` under this policy
    pub fn strategy_for<R: TransferableResource>(&self, resource: &R) -> ExpiryStrategy {
        ExpiryStrategy::for_kind(resource.key().kind, self.policy.transfer_period_years)
    }

    pub fn evaluate<R: TransferableResource>(
        &self,
        resource: &R,
        command: TransferCommand,
        acting: &RegistrarId,
        now: DateTime<Utc>,
        strategy: ExpiryStrategy,
    ) -> Result<Evaluation<R>, TransferError> {
        let evaluation = match command {
            TransferCommand::Request { period_years } => {
                self.request(resource, period_years, acting, now, strategy)?
            }
            TransferCommand::Approve => self.approve(resource, acting, now, false)?,
            TransferCommand::ServerApprove => self.approve(resource, acting, now, true)?,
            TransferCommand::Reject => {
                let attempt = open_attempt(resource, now)?;
                if acting != &attempt.losing_registrar_id {
                    return Err(TransferError::NotAuthorized);
                }
                deny(resource, attempt, TransferStatus::ClientRejected, now)
            }
            TransferCommand::Cancel => {
                let attempt = open_attempt(resource, now)?;
                if acting != &attempt.gaining_registrar_id {
                    return Err(TransferError::NotTransferInitiator);
                }
                deny(resource, attempt, TransferStatus::ClientCancelled, now)
            }
            TransferCommand::ServerCancel => {
                let attempt = open_attempt(resource, now)?;
                deny(resource, attempt, TransferStatus::ServerCancelled, now)
            }
        };

        evaluation.resource.transfer_data().validate()?;
        Ok(Evaluation {
            history_type: command.history_type(),
            ..evaluation
        })
    }

    /// Read-only transfer query. Parties may always query; anyone else
    /// needs valid auth-info. A pending attempt whose window has elapsed
    /// reads as server approved even before the scheduler has fired.
    pub fn query<R: TransferableResource>(
        &self,
        resource: &R,
        acting: &RegistrarId,
        auth_info_verified: bool,
        now: DateTime<Utc>,
    ) -> Result<TransferResponse, TransferError> {
        let attempt = resource
            .transfer_data()
            .attempt()
            .ok_or_else(|| TransferError::NoTransferHistory(resource.key().to_string()))?;
        if !attempt.is_party(acting) && !auth_info_verified {
            return Err(TransferError::NotAuthorized);
        }
        if attempt.status.is_pending() && attempt.window_elapsed(now) {
            let projected = TransferData::Attempt(
                attempt.resolve(TransferStatus::ServerApproved, attempt.pending_expiration_time),
            );
            return Ok(TransferResponse::new(resource.key(), &projected));
        }
        Ok(TransferResponse::new(resource.key(), resource.transfer_data()))
    }

    fn request<R: TransferableResource>(
        &self,
        resource: &R,
        period_years: Option<u32>,
        gaining: &RegistrarId,
        now: DateTime<Utc>,
        strategy: ExpiryStrategy,
    ) -> Result<Evaluation<R>, TransferError> {
        let key = resource.key();
        if resource.transfer_data().is_pending() {
            return Err(TransferError::AlreadyPendingTransfer(key.to_string()));
        }
        if gaining == resource.sponsor() {
            return Err(TransferError::ObjectAlreadySponsored);
        }
        let expected = self.policy.transfer_period_years;
        let years = period_years.unwrap_or(expected);
        if years != expected {
            return Err(TransferError::InvalidTransferPeriod {
                requested: years,
                expected,
            });
        }
        self.check_eligibility(resource, now)?;

        let losing = resource.sponsor().clone();
        let transfer_id = TransferId::new();
        let expiration = now + self.policy.automatic_transfer_length();
        let transferred_expiration =
            strategy.transferred_expiration(resource.registration_expiration_time(), expiration);

        let mut attempt = TransferAttempt {
            transfer_id,
            status: TransferStatus::Pending,
            gaining_registrar_id: gaining.clone(),
            losing_registrar_id: losing.clone(),
            request_time: now,
            pending_expiration_time: expiration,
            server_approve_entities: BTreeSet::new(),
            transferred_registration_expiration_time: transferred_expiration,
            resolution_time: None,
        };

        // Records that only stand if the window elapses untouched
        let mut speculative: Vec<LedgerRecord> = Vec::new();
        if strategy.is_billable() {
            speculative.push(
                BillingEvent::deferred_transfer(
                    gaining.clone(),
                    key.clone(),
                    transfer_id,
                    years,
                    self.policy.transfer_cost,
                    &self.policy.currency,
                    expiration,
                )
                .into(),
            );
            if let Some(new_expiration) = transferred_expiration {
                speculative.push(
                    BillingEvent::deferred_autorenew(
                        gaining.clone(),
                        key.clone(),
                        transfer_id,
                        &self.policy.currency,
                        new_expiration,
                    )
                    .into(),
                );
            }
        }
        let server_approved = TransferData::Attempt(
            attempt.resolve(TransferStatus::ServerApproved, expiration),
        );
        speculative.push(
            PollMessage::new(
                losing.clone(),
                key.clone(),
                expiration,
                TransferResponse::new(key, &server_approved),
            )
            .into(),
        );
        attempt.server_approve_entities = speculative.iter().map(LedgerRecord::key).collect();

        let data = TransferData::Attempt(attempt);
        let pending = TransferResponse::new(key, &data);
        let mut create: Vec<LedgerRecord> = vec![
            PollMessage::new(gaining.clone(), key.clone(), now, pending.clone()).into(),
            PollMessage::new(losing, key.clone(), now, pending).into(),
        ];
        create.extend(speculative);

        Ok(Evaluation {
            resource: resource.with_transfer_data(data),
            diff: LedgerDiff {
                create,
                ..Default::default()
            },
            history_type: HistoryType::TransferRequest,
            transfer_id,
        })
    }

    fn check_eligibility<R: TransferableResource>(
        &self,
        resource: &R,
        now: DateTime<Utc>,
    ) -> Result<(), TransferError> {
        let base = resource.base();
        if let Some(status) = base.statuses.iter().find(|s| s.blocks_transfer()) {
            return Err(TransferError::NotEligibleForTransfer(format!(
                "resource has status {:?}",
                status
            )));
        }
        if let Some(last) = base.last_transfer_time
            && now < last + self.policy.transfer_lock_period()
        {
            return Err(TransferError::NotEligibleForTransfer(format!(
                "resource was transferred at {}",
                last
            )));
        }
        Ok(())
    }

    fn approve<R: TransferableResource>(
        &self,
        resource: &R,
        acting: &RegistrarId,
        now: DateTime<Utc>,
        server: bool,
    ) -> Result<Evaluation<R>, TransferError> {
        let attempt = if server {
            pending_attempt(resource)?
        } else {
            open_attempt(resource, now)?
        };
        if acting != &attempt.losing_registrar_id {
            return Err(TransferError::NotAuthorized);
        }
        let (status, resolved_at) = if server {
            if !attempt.window_elapsed(now) {
                return Err(TransferError::NotEligibleForTransfer(format!(
                    "automatic transfer window open until {}",
                    attempt.pending_expiration_time
                )));
            }
            // Effective at the end of the window, however late the trigger ran
            (TransferStatus::ServerApproved, attempt.pending_expiration_time)
        } else {
            (TransferStatus::ClientApproved, now)
        };

        let resolved = TransferData::Attempt(attempt.resolve(status, resolved_at));
        let next = resource
            .apply_transfer_side_effects(attempt, resolved_at)
            .with_transfer_data(resolved);

        let mut diff = LedgerDiff::default();
        for entity in &attempt.server_approve_entities {
            match entity.kind {
                EntityKind::BillingEvent => diff.mature.push((*entity, resolved_at)),
                // The losing registrar's auto-approval notice already fired
                EntityKind::PollMessage if server => {}
                EntityKind::PollMessage => diff.delete.push(*entity),
            }
        }
        let recipients = if server {
            vec![&attempt.gaining_registrar_id]
        } else {
            vec![&attempt.gaining_registrar_id, &attempt.losing_registrar_id]
        };
        diff.create = notices(&next, attempt, &recipients, resolved_at);

        Ok(Evaluation {
            resource: next,
            diff,
            history_type: HistoryType::TransferApprove,
            transfer_id: attempt.transfer_id,
        })
    }
}

fn pending_attempt<R: TransferableResource>(resource: &R) -> Result<&TransferAttempt, TransferError> {
    resource
        .transfer_data()
        .pending()
        .ok_or_else(|| TransferError::NotPendingTransfer(resource.key().to_string()))
}

/// A pending attempt still inside its response window. Once the window
/// has elapsed the attempt belongs to the scheduler.
fn open_attempt<R: TransferableResource>(
    resource: &R,
    now: DateTime<Utc>,
) -> Result<&TransferAttempt, TransferError> {
    let attempt = pending_attempt(resource)?;
    if attempt.window_elapsed(now) {
        return Err(TransferError::NotPendingTransfer(resource.key().to_string()));
    }
    Ok(attempt)
}

/// Resolve a pending transfer without moving the resource: every
/// speculative record goes.
fn deny<R: TransferableResource>(
    resource: &R,
    attempt: &TransferAttempt,
    status: TransferStatus,
    now: DateTime<Utc>,
) -> Evaluation<R> {
    let next = resource.with_transfer_data(TransferData::Attempt(attempt.resolve(status, now)));
    let recipients = match status {
        // The gaining registrar cancelled; it already knows
        TransferStatus::ClientCancelled => vec![&attempt.losing_registrar_id],
        _ => vec![&attempt.gaining_registrar_id, &attempt.losing_registrar_id],
    };
    let diff = LedgerDiff {
        create: notices(&next, attempt, &recipients, now),
        delete: attempt.server_approve_entities.iter().copied().collect::<Vec<EntityKey>>(),
        mature: Vec::new(),
    };
    Evaluation {
        resource: next,
        diff,
        history_type: HistoryType::TransferReject,
        transfer_id: attempt.transfer_id,
    }
}

fn notices<R: TransferableResource>(
    resolved: &R,
    attempt: &TransferAttempt,
    recipients: &[&RegistrarId],
    event_time: DateTime<Utc>,
) -> Vec<LedgerRecord> {
    let payload = TransferResponse::new(resolved.key(), resolved.transfer_data());
    debug_assert_eq!(payload.transfer_id, Some(attempt.transfer_id));
    recipients
        .iter()
        .map(|registrar| {
            PollMessage::new(
                (*registrar).clone(),
                resolved.key().clone(),
                event_time,
                payload.clone(),
            )
            .into()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::ledger::BillingReason;
    use crate::transfer::resource::{Contact, Domain, ResourceStatus};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn a() -> RegistrarId {
        RegistrarId::new("registrar-a")
    }

    fn b() -> RegistrarId {
        RegistrarId::new("registrar-b")
    }

    fn evaluator() -> TransferEvaluator {
        TransferEvaluator::new(TransferConfig::default())
    }

    fn domain() -> Domain {
        Domain::new(
            "example.tld",
            b(),
            Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        )
    }

    fn run<R: TransferableResource>(
        resource: &R,
        command: TransferCommand,
        acting: &RegistrarId,
        now: DateTime<Utc>,
    ) -> Result<Evaluation<R>, TransferError> {
        let ev = evaluator();
        let strategy = ev.strategy_for(resource);
        ev.evaluate(resource, command, acting, now, strategy)
    }

    fn requested(resource: &Domain) -> Evaluation<Domain> {
        run(
            resource,
            TransferCommand::Request { period_years: None },
            &a(),
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn test_request_creates_pending_attempt() {
        let eval = requested(&domain());
        let attempt = eval.resource.transfer_data().pending().unwrap();

        assert_eq!(attempt.gaining_registrar_id, a());
        assert_eq!(attempt.losing_registrar_id, b());
        assert_eq!(attempt.pending_expiration_time, t0() + Duration::days(5));
        assert_eq!(
            attempt.transferred_registration_expiration_time,
            Some(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap())
        );
        assert!(
            eval.resource
                .base
                .statuses
                .contains(&ResourceStatus::PendingTransfer)
        );
        // Sponsorship does not move until approval
        assert_eq!(eval.resource.base.sponsor, b());
        assert_eq!(eval.history_type, HistoryType::TransferRequest);
    }

    #[test]
    fn test_request_diff_for_domain() {
        let eval = requested(&domain());
        let attempt = eval.resource.transfer_data().pending().unwrap();

        let immediate: Vec<_> = eval
            .diff
            .poll_messages()
            .filter(|m| m.event_time == t0())
            .map(|m| m.registrar_id.clone())
            .collect();
        assert_eq!(immediate, vec![a(), b()]);

        let charges: Vec<_> = eval.diff.billing_events().collect();
        assert_eq!(charges.len(), 2);
        assert_eq!(charges[0].reason, BillingReason::Transfer);
        assert_eq!(charges[0].registrar_id, a());
        assert_eq!(charges[1].reason, BillingReason::Autorenew);

        // billing events + losing auto-approval notice
        assert_eq!(attempt.server_approve_entities.len(), 3);
        let auto_notice = eval
            .diff
            .poll_messages()
            .find(|m| m.event_time == attempt.pending_expiration_time)
            .unwrap();
        assert_eq!(auto_notice.registrar_id, b());
        assert_eq!(auto_notice.payload.status, TransferStatus::ServerApproved);
        assert!(attempt.server_approve_entities.contains(&auto_notice.key()));
    }

    #[test]
    fn test_contact_request_is_not_billed() {
        let contact = Contact::new("sh8013", b(), t0() - Duration::days(400));
        let eval = run(
            &contact,
            TransferCommand::Request { period_years: None },
            &a(),
            t0(),
        )
        .unwrap();

        assert_eq!(eval.diff.billing_events().count(), 0);
        let attempt = eval.resource.transfer_data().pending().unwrap();
        assert_eq!(attempt.server_approve_entities.len(), 1);
        assert!(attempt.transferred_registration_expiration_time.is_none());
    }

    #[test]
    fn test_request_while_pending_fails() {
        let eval = requested(&domain());
        let err = run(
            &eval.resource,
            TransferCommand::Request { period_years: None },
            &RegistrarId::new("registrar-c"),
            t0() + Duration::days(1),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::AlreadyPendingTransfer(_)));
    }

    #[test]
    fn test_request_by_sponsor_fails() {
        let err = run(
            &domain(),
            TransferCommand::Request { period_years: None },
            &b(),
            t0(),
        )
        .unwrap_err();
        assert_eq!(err, TransferError::ObjectAlreadySponsored);
    }

    #[test]
    fn test_request_with_wrong_period_fails() {
        let err = run(
            &domain(),
            TransferCommand::Request {
                period_years: Some(2),
            },
            &a(),
            t0(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransferError::InvalidTransferPeriod {
                requested: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn test_request_on_prohibited_resource_fails() {
        let mut prohibited = domain();
        prohibited
            .base
            .statuses
            .insert(ResourceStatus::ClientTransferProhibited);
        let err = run(
            &prohibited,
            TransferCommand::Request { period_years: None },
            &a(),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::NotEligibleForTransfer(_)));
    }

    #[test]
    fn test_recent_transfer_lock() {
        let mut recent = domain();
        recent.base.last_transfer_time = Some(t0() - Duration::days(30));
        let err = run(
            &recent,
            TransferCommand::Request { period_years: None },
            &a(),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::NotEligibleForTransfer(_)));

        recent.base.last_transfer_time = Some(t0() - Duration::days(61));
        assert!(
            run(
                &recent,
                TransferCommand::Request { period_years: None },
                &a(),
                t0()
            )
            .is_ok()
        );
    }

    #[test]
    fn test_client_approve_moves_sponsor_and_keeps_billing() {
        let pending = requested(&domain());
        let entities = pending
            .resource
            .transfer_data()
            .pending()
            .unwrap()
            .server_approve_entities
            .clone();
        let now = t0() + Duration::days(1);

        let eval = run(&pending.resource, TransferCommand::Approve, &b(), now).unwrap();

        assert_eq!(eval.status(), TransferStatus::ClientApproved);
        assert_eq!(eval.resource.base.sponsor, a());
        assert_eq!(
            eval.resource.registration_expiration_time,
            Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(eval.resource.base.last_transfer_time, Some(now));
        assert!(
            !eval
                .resource
                .base
                .statuses
                .contains(&ResourceStatus::PendingTransfer)
        );

        let matured: BTreeSet<_> = eval.diff.mature.iter().map(|(k, _)| *k).collect();
        let deleted: BTreeSet<_> = eval.diff.delete.iter().copied().collect();
        assert_eq!(matured.len(), 2);
        assert_eq!(deleted.len(), 1);
        assert_eq!(&matured | &deleted, entities);
        assert_eq!(eval.diff.poll_messages().count(), 2);
    }

    #[test]
    fn test_approve_by_gaining_registrar_fails() {
        let pending = requested(&domain());
        let err = run(
            &pending.resource,
            TransferCommand::Approve,
            &a(),
            t0() + Duration::days(1),
        )
        .unwrap_err();
        assert_eq!(err, TransferError::NotAuthorized);
    }

    #[test]
    fn test_server_approve_before_window_fails() {
        let pending = requested(&domain());
        let err = run(
            &pending.resource,
            TransferCommand::ServerApprove,
            &b(),
            t0() + Duration::days(4),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::NotEligibleForTransfer(_)));
    }

    #[test]
    fn test_server_approve_is_effective_at_window_end() {
        let pending = requested(&domain());
        let late = t0() + Duration::days(6);
        let eval = run(&pending.resource, TransferCommand::ServerApprove, &b(), late).unwrap();

        assert_eq!(eval.status(), TransferStatus::ServerApproved);
        assert_eq!(eval.history_type, HistoryType::TransferServerApprove);
        assert_eq!(
            eval.resource.base.last_transfer_time,
            Some(t0() + Duration::days(5))
        );
        assert!(
            eval.diff
                .mature
                .iter()
                .all(|(_, at)| *at == t0() + Duration::days(5))
        );
        // The losing registrar's auto-approval notice stands; only the
        // gaining registrar gets a fresh one
        assert!(eval.diff.delete.is_empty());
        let notified: Vec<_> = eval.diff.poll_messages().map(|m| m.registrar_id.clone()).collect();
        assert_eq!(notified, vec![a()]);
    }

    #[test]
    fn test_client_commands_after_window_fail() {
        let pending = requested(&domain());
        for at in [t0() + Duration::days(5), t0() + Duration::days(6)] {
            for (command, acting) in [
                (TransferCommand::Approve, b()),
                (TransferCommand::Reject, b()),
                (TransferCommand::Cancel, a()),
                (TransferCommand::ServerCancel, b()),
            ] {
                let err = run(&pending.resource, command, &acting, at).unwrap_err();
                assert!(
                    matches!(err, TransferError::NotPendingTransfer(_)),
                    "{command:?} at {at} gave {err:?}"
                );
            }
        }

        let just_inside = t0() + Duration::days(5) - Duration::seconds(1);
        let eval = run(&pending.resource, TransferCommand::Reject, &b(), just_inside).unwrap();
        assert_eq!(eval.status(), TransferStatus::ClientRejected);
    }

    #[test]
    fn test_query_after_window_reads_server_approved() {
        let ev = evaluator();
        let pending = requested(&domain()).resource;

        let inside = ev
            .query(&pending, &a(), false, t0() + Duration::days(4))
            .unwrap();
        assert_eq!(inside.status, TransferStatus::Pending);

        let after = ev
            .query(&pending, &b(), false, t0() + Duration::days(6))
            .unwrap();
        assert_eq!(after.status, TransferStatus::ServerApproved);
        assert_eq!(after.action_time, Some(t0() + Duration::days(5)));
        // The stored attempt is untouched until the scheduler fires
        assert!(pending.transfer_data().is_pending());
    }

    #[test]
    fn test_reject_deletes_every_speculative_entity() {
        let pending = requested(&domain());
        let entities = pending
            .resource
            .transfer_data()
            .pending()
            .unwrap()
            .server_approve_entities
            .clone();

        let eval = run(
            &pending.resource,
            TransferCommand::Reject,
            &b(),
            t0() + Duration::days(1),
        )
        .unwrap();

        assert_eq!(eval.status(), TransferStatus::ClientRejected);
        assert_eq!(eval.resource.base.sponsor, b());
        assert_eq!(eval.diff.delete.iter().copied().collect::<BTreeSet<_>>(), entities);
        assert!(eval.diff.mature.is_empty());
        let notified: Vec<_> = eval.diff.poll_messages().map(|m| m.registrar_id.clone()).collect();
        assert_eq!(notified, vec![a(), b()]);
        assert_eq!(eval.history_type, HistoryType::TransferReject);
    }

    #[test]
    fn test_cancel_notifies_losing_registrar_only() {
        let pending = requested(&domain());
        let eval = run(
            &pending.resource,
            TransferCommand::Cancel,
            &a(),
            t0() + Duration::days(2),
        )
        .unwrap();

        assert_eq!(eval.status(), TransferStatus::ClientCancelled);
        assert_eq!(eval.resource.base.sponsor, b());
        assert_eq!(eval.diff.delete.len(), 3);
        let notified: Vec<_> = eval.diff.poll_messages().map(|m| m.registrar_id.clone()).collect();
        assert_eq!(notified, vec![b()]);
        assert_eq!(eval.history_type, HistoryType::TransferCancel);
    }

    #[test]
    fn test_cancel_by_non_initiator_fails() {
        let pending = requested(&domain());
        for registrar in [b(), RegistrarId::new("registrar-c")] {
            let err = run(
                &pending.resource,
                TransferCommand::Cancel,
                &registrar,
                t0() + Duration::days(2),
            )
            .unwrap_err();
            assert_eq!(err, TransferError::NotTransferInitiator);
        }
    }

    #[test]
    fn test_resolution_commands_require_pending() {
        let resolved = run(
            &requested(&domain()).resource,
            TransferCommand::Cancel,
            &a(),
            t0() + Duration::days(1),
        )
        .unwrap()
        .resource;

        for (command, acting) in [
            (TransferCommand::Approve, b()),
            (TransferCommand::Reject, b()),
            (TransferCommand::Cancel, a()),
            (TransferCommand::ServerApprove, b()),
            (TransferCommand::ServerCancel, b()),
        ] {
            let err = run(&resolved, command, &acting, t0() + Duration::days(6)).unwrap_err();
            assert!(
                matches!(err, TransferError::NotPendingTransfer(_)),
                "{command:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_server_cancel_notifies_both() {
        let pending = requested(&domain());
        let eval = run(
            &pending.resource,
            TransferCommand::ServerCancel,
            &b(),
            t0() + Duration::days(1),
        )
        .unwrap();
        assert_eq!(eval.status(), TransferStatus::ServerCancelled);
        assert_eq!(eval.diff.poll_messages().count(), 2);
        assert_eq!(eval.history_type, HistoryType::TransferServerCancel);
    }

    #[test]
    fn test_new_request_after_resolution_gets_fresh_attempt() {
        let first = requested(&domain());
        let first_id = first.transfer_id;
        let rejected = run(
            &first.resource,
            TransferCommand::Reject,
            &b(),
            t0() + Duration::days(1),
        )
        .unwrap();

        let again = run(
            &rejected.resource,
            TransferCommand::Request { period_years: None },
            &a(),
            t0() + Duration::days(2),
        )
        .unwrap();
        assert_ne!(again.transfer_id, first_id);
        assert!(again.resource.transfer_data().is_pending());
    }

    #[test]
    fn test_query_authorization() {
        let ev = evaluator();
        let fresh = domain();
        assert!(matches!(
            ev.query(&fresh, &a(), false, t0()),
            Err(TransferError::NoTransferHistory(_))
        ));

        let pending = requested(&domain()).resource;
        let outsider = RegistrarId::new("registrar-c");
        assert_eq!(
            ev.query(&pending, &outsider, false, t0()).unwrap_err(),
            TransferError::NotAuthorized
        );
        assert!(ev.query(&pending, &outsider, true, t0()).is_ok());

        let response = ev.query(&pending, &a(), false, t0()).unwrap();
        assert_eq!(response.status, TransferStatus::Pending);
        assert_eq!(response.gaining_registrar_id, Some(a()));
    }
}
