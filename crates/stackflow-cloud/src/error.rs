//! Reconciliation error types

use thiserror::Error;

/// How a driver should treat a [`ReconcileError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected condition, equivalent to success.
    ///
    /// Reconcilers absorb these per Change; one reaching the driver means
    /// the reconciler chose not to.
    Ignorable,
    /// Provider failure, the driver decides whether to requeue
    Transient,
    /// Fatal for the current pass, never retried automatically
    InvalidConfig,
    /// Programming error between layers
    Contract,
}

/// Step of a reconciliation pass an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CurrentState,
    DesiredState,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::CurrentState => write!(f, "current state"),
            Phase::DesiredState => write!(f, "desired state"),
            Phase::Create => write!(f, "create"),
            Phase::Update => write!(f, "update"),
            Phase::Delete => write!(f, "delete"),
        }
    }
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Unsupported version marker {version:?} on {instance}")]
    UnsupportedVersion { instance: String, version: String },

    #[error("Template collision: {name} declared by both {first} and {second}")]
    Collision {
        name: String,
        first: String,
        second: String,
    },

    #[error("Contract violation in {resource}: {message}")]
    Contract { resource: String, message: String },

    #[error("{key}: {source}")]
    Change {
        key: String,
        #[source]
        source: Box<ReconcileError>,
    },

    #[error("{resource} ({phase}): {source}")]
    Resource {
        resource: String,
        phase: Phase,
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ReconcileError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn contract(resource: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::Contract {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn provider(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        ReconcileError::Provider(Box::new(error))
    }

    /// Wrap the error with the resource and phase it was raised in.
    ///
    /// Already wrapped errors are returned unchanged so the innermost
    /// context wins.
    pub fn in_resource(self, resource: impl Into<String>, phase: Phase) -> Self {
        match self {
            wrapped @ ReconcileError::Resource { .. } => wrapped,
            other => ReconcileError::Resource {
                resource: resource.into(),
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Wrap the error with the key of the Change being applied
    pub fn in_change(self, key: impl Into<String>) -> Self {
        match self {
            wrapped @ (ReconcileError::Change { .. } | ReconcileError::Resource { .. }) => wrapped,
            other => ReconcileError::Change {
                key: key.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::AlreadyExists(_) | ReconcileError::NotFound(_) => ErrorClass::Ignorable,
            ReconcileError::Provider(_) => ErrorClass::Transient,
            ReconcileError::InvalidConfig { .. }
            | ReconcileError::UnsupportedVersion { .. }
            | ReconcileError::Collision { .. } => ErrorClass::InvalidConfig,
            ReconcileError::Contract { .. } => ErrorClass::Contract,
            ReconcileError::Change { source, .. } | ReconcileError::Resource { source, .. } => {
                source.class()
            }
        }
    }

    /// The innermost error, with resource context stripped
    pub fn root(&self) -> &ReconcileError {
        match self {
            ReconcileError::Change { source, .. } | ReconcileError::Resource { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    pub fn is_ignorable(&self) -> bool {
        self.class() == ErrorClass::Ignorable
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
