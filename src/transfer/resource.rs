//! Transferable resources
//!
//! Domains and contacts share one transfer lifecycle. The evaluator only
//! sees the [`TransferableResource`] capability; the one resource-specific
//! difference (registration expiry) is carried by an [`ExpiryStrategy`]
//! value chosen per command.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::data::{TransferAttempt, TransferData};
use crate::core_types::{RegistrarId, ResourceKey, ResourceKind};

/// Registration can never be extended past this many years from the
/// automatic transfer time.
pub const MAX_REGISTRATION_YEARS: u32 = 10;

/// EPP status values that matter to transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceStatus {
    ClientTransferProhibited,
    ServerTransferProhibited,
    PendingDelete,
    /// Maintained by the transfer lifecycle while an attempt is pending
    PendingTransfer,
}

impl ResourceStatus {
    /// Statuses under which a new transfer request is refused
    pub fn blocks_transfer(&self) -> bool {
        matches!(
            self,
            ResourceStatus::ClientTransferProhibited
                | ResourceStatus::ServerTransferProhibited
                | ResourceStatus::PendingDelete
        )
    }
}

/// Fields every transferable resource carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBase {
    pub key: ResourceKey,
    pub sponsor: RegistrarId,
    #[serde(default)]
    pub statuses: BTreeSet<ResourceStatus>,
    /// Auth-info password shared with the registrant
    #[serde(default)]
    pub auth_info: Option<String>,
    pub creation_time: DateTime<Utc>,
    #[serde(default)]
    pub deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_transfer_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transfer_data: TransferData,
    /// Optimistic concurrency version, bumped by every commit
    #[serde(default)]
    pub version: u64,
}

impl ResourceBase {
    pub fn new(key: ResourceKey, sponsor: RegistrarId, creation_time: DateTime<Utc>) -> Self {
        Self {
            key,
            sponsor,
            statuses: BTreeSet::new(),
            auth_info: None,
            creation_time,
            deletion_time: None,
            last_transfer_time: None,
            transfer_data: TransferData::None,
            version: 0,
        }
    }
}

/// Capability the transfer lifecycle needs from a resource.
pub trait TransferableResource: Clone + Send + Sync {
    fn base(&self) -> &ResourceBase;

    fn base_mut(&mut self) -> &mut ResourceBase;

    fn key(&self) -> &ResourceKey {
        &self.base().key
    }

    fn sponsor(&self) -> &RegistrarId {
        &self.base().sponsor
    }

    fn transfer_data(&self) -> &TransferData {
        &self.base().transfer_data
    }

    fn registration_expiration_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Exists and is not deleted at `now`
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.base().deletion_time.is_none_or(|t| t > now)
    }

    /// Copy of this resource holding `data`. Keeps the pendingTransfer
    /// status flag in step with the transfer status.
    fn with_transfer_data(&self, data: TransferData) -> Self {
        let mut next = self.clone();
        let base = next.base_mut();
        if data.is_pending() {
            base.statuses.insert(ResourceStatus::PendingTransfer);
        } else {
            base.statuses.remove(&ResourceStatus::PendingTransfer);
        }
        base.transfer_data = data;
        next
    }

    /// Effects of a completed transfer on the resource itself.
    fn apply_transfer_side_effects(&self, attempt: &TransferAttempt, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        let base = next.base_mut();
        base.sponsor = attempt.gaining_registrar_id.clone();
        base.last_transfer_time = Some(now);
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub registration_expiration_time: DateTime<Utc>,
}

impl Domain {
    pub fn new(
        name: &str,
        sponsor: RegistrarId,
        creation_time: DateTime<Utc>,
        registration_expiration_time: DateTime<Utc>,
    ) -> Self {
        Self {
            base: ResourceBase::new(ResourceKey::domain(name), sponsor, creation_time),
            registration_expiration_time,
        }
    }
}

impl TransferableResource for Domain {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    fn registration_expiration_time(&self) -> Option<DateTime<Utc>> {
        Some(self.registration_expiration_time)
    }

    fn apply_transfer_side_effects(&self, attempt: &TransferAttempt, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.base.sponsor = attempt.gaining_registrar_id.clone();
        next.base.last_transfer_time = Some(now);
        if let Some(expiration) = attempt.transferred_registration_expiration_time {
            next.registration_expiration_time = expiration;
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(flatten)]
    pub base: ResourceBase,
}

impl Contact {
    pub fn new(id: &str, sponsor: RegistrarId, creation_time: DateTime<Utc>) -> Self {
        Self {
            base: ResourceBase::new(ResourceKey::contact(id), sponsor, creation_time),
        }
    }
}

impl TransferableResource for Contact {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }
}

/// Any stored resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Resource {
    Domain(Domain),
    Contact(Contact),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Domain(_) => ResourceKind::Domain,
            Resource::Contact(_) => ResourceKind::Contact,
        }
    }

    pub fn version(&self) -> u64 {
        self.base().version
    }

    /// Builder-style helpers for provisioning
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.base_mut().statuses.insert(status);
        self
    }

    pub fn with_auth_info(mut self, password: impl Into<String>) -> Self {
        self.base_mut().auth_info = Some(password.into());
        self
    }
}

impl From<Domain> for Resource {
    fn from(domain: Domain) -> Self {
        Resource::Domain(domain)
    }
}

impl From<Contact> for Resource {
    fn from(contact: Contact) -> Self {
        Resource::Contact(contact)
    }
}

impl TransferableResource for Resource {
    fn base(&self) -> &ResourceBase {
        match self {
            Resource::Domain(d) => &d.base,
            Resource::Contact(c) => &c.base,
        }
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        match self {
            Resource::Domain(d) => &mut d.base,
            Resource::Contact(c) => &mut c.base,
        }
    }

    fn registration_expiration_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Resource::Domain(d) => d.registration_expiration_time(),
            Resource::Contact(c) => c.registration_expiration_time(),
        }
    }

    fn apply_transfer_side_effects(&self, attempt: &TransferAttempt, now: DateTime<Utc>) -> Self {
        match self {
            Resource::Domain(d) => Resource::Domain(d.apply_transfer_side_effects(attempt, now)),
            Resource::Contact(c) => Resource::Contact(c.apply_transfer_side_effects(attempt, now)),
        }
    }
}

/// How a completed transfer changes the registration period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStrategy {
    /// No registration period (contacts)
    Unchanged,
    /// Registration extended, and billed, by this many years (domains)
    ExtendByYears(u32),
}

impl ExpiryStrategy {
    pub fn for_kind(kind: ResourceKind, period_years: u32) -> Self {
        match kind {
            ResourceKind::Domain => ExpiryStrategy::ExtendByYears(period_years),
            ResourceKind::Contact => ExpiryStrategy::Unchanged,
        }
    }

    /// A transfer that extends the registration is billed to the gaining
    /// registrar.
    pub fn is_billable(&self) -> bool {
        matches!(self, ExpiryStrategy::ExtendByYears(_))
    }

    /// Expiry after a transfer completing at `automatic_transfer_time`.
    ///
    /// Autorenews falling inside the pending window are projected first,
    /// then the transfer period is added, capped at
    /// [`MAX_REGISTRATION_YEARS`] past the transfer time.
    pub fn transferred_expiration(
        &self,
        current: Option<DateTime<Utc>>,
        automatic_transfer_time: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let years = match self {
            ExpiryStrategy::Unchanged => return None,
            ExpiryStrategy::ExtendByYears(years) => *years,
        };
        let mut projected = current?;
        while projected <= automatic_transfer_time {
            projected = add_years(projected, 1)?;
        }
        let extended = add_years(projected, years)?;
        let cap = add_years(automatic_transfer_time, MAX_REGISTRATION_YEARS)?;
        Some(extended.min(cap))
    }
}

fn add_years(time: DateTime<Utc>, years: u32) -> Option<DateTime<Utc>> {
    time.checked_add_months(Months::new(years.checked_mul(12)?))
}
