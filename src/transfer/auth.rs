//! Session and auth-info collaborators

use subtle::ConstantTimeEq;

use crate::core_types::RegistrarId;
use crate::transfer::error::TransferError;
use crate::transfer::resource::{Resource, TransferableResource};

/// Who is issuing the command. `None` before login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub registrar_id: Option<RegistrarId>,
}

impl SessionContext {
    pub fn logged_in(registrar_id: impl Into<RegistrarId>) -> Self {
        Self {
            registrar_id: Some(registrar_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn require_registrar(&self) -> Result<&RegistrarId, TransferError> {
        self.registrar_id.as_ref().ok_or(TransferError::NotLoggedIn)
    }
}

/// Checks an auth-info token against a resource
pub trait AuthInfoVerifier: Send + Sync {
    fn verify(&self, token: &str, resource: &Resource) -> bool;
}

/// Compares against the password stored on the resource. A resource without
/// a password accepts no token.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceAuthInfoVerifier;

impl AuthInfoVerifier for ResourceAuthInfoVerifier {
    fn verify(&self, token: &str, resource: &Resource) -> bool {
        resource
            .base()
            .auth_info
            .as_deref()
            .is_some_and(|password| password.as_bytes().ct_eq(token.as_bytes()).into())
    }
}
