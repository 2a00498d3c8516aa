//! Business rules for permissions, roles, users, and login.
//!
//! # Purpose
//! Managers validate input, run multi-row writes inside one store
//! transaction, and push the result into the policy fact base after commit.
//!
//! # Transactions
//! Each mutating operation has an `*_in` form that takes an open
//! [`StoreTx`](crate::store::StoreTx). The plain form opens a transaction,
//! calls `*_in`, and commits. Callers that already hold a transaction (the
//! seed loader, for one) call `*_in` directly so no nested transaction is
//! ever opened.
//!
//! # Policy sync failures
//! The store is authoritative. When a post-commit sync fails the write
//! stays committed and the failure is logged; with `strict_sync` it is also
//! returned as [`ManagerError::PolicySync`].
use crate::auth::rbac::PolicyError;
use crate::store::StoreError;
use thiserror::Error;

pub mod diff;
pub mod login;
pub mod permission;
pub mod role;
pub mod user;

pub use login::LoginManager;
pub use permission::PermissionManager;
pub use role::RoleManager;
pub use user::UserManager;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid parent node")]
    InvalidParent,
    #[error("Contains children, cannot be deleted")]
    NotAllowDeleteWithChild,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Token invalidation")]
    InvalidToken,
    #[error("No access")]
    NoPermission,
    #[error("policy sync failed: {0}")]
    PolicySync(#[source] PolicyError),
    #[error(transparent)]
    Internal(StoreError),
}

/// Error category shared by the manager and HTTP layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authentication,
    Authorization,
    RateLimit,
    Internal,
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Validation(_)
            | ManagerError::InvalidParent
            | ManagerError::NotAllowDeleteWithChild => ErrorKind::Validation,
            ManagerError::NotFound(_) => ErrorKind::NotFound,
            ManagerError::InvalidToken => ErrorKind::Authentication,
            ManagerError::NoPermission => ErrorKind::Authorization,
            ManagerError::PolicySync(_) | ManagerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            // A unique constraint tripped inside the transaction is a concurrent duplicate.
            StoreError::Conflict(detail) => {
                tracing::debug!(detail = %detail, "unique constraint rejected write");
                ManagerError::Validation("Record already exists".to_string())
            }
            StoreError::NotFound(what) => ManagerError::NotFound(what),
            other => ManagerError::Internal(other),
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Apply the sync failure policy to a post-commit sync result.
pub(crate) fn settle_sync(
    result: Result<(), PolicyError>,
    strict: bool,
    subject: &str,
    id: &str,
) -> ManagerResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(
                error = %err,
                subject,
                id,
                "policy sync failed; fact base is stale until the next reload"
            );
            if strict {
                Err(ManagerError::PolicySync(err))
            } else {
                Ok(())
            }
        }
    }
}
