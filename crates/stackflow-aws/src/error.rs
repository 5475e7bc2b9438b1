//! AWS client error types

use stackflow_cloud::ReconcileError;
use thiserror::Error;

/// Errors returned by the cloud clients.
///
/// The typed conditions are the ones reconcilers branch on; everything else
/// is opaque and propagated to the driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AwsError {
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource already owned by you: {0}")]
    AlreadyOwnedByYou(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("No updates are to be performed: {0}")]
    NoUpdates(String),

    #[error("Delete conflict: {0}")]
    DeleteConflict(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("API error: {0}")]
    Api(String),
}

impl AwsError {
    /// Create found the resource in place, created by us or earlier passes
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            AwsError::AlreadyExists(_) | AwsError::AlreadyOwnedByYou(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound(_))
    }
}

/// Reconcilers absorb "already exists" on create and "not found" on delete
/// themselves; anything converted here failed the pass.
impl From<AwsError> for ReconcileError {
    fn from(error: AwsError) -> Self {
        ReconcileError::provider(error)
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
