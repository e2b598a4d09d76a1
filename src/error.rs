//! Error types for the Navigator controller

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How the dispatcher should treat a failed reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to clear on its own; requeue with exponential backoff.
    Retryable,
    /// Needs operator action (or a spec edit) before a retry can succeed.
    Fatal,
}

/// Errors that can occur while reconciling a cluster or executing an action
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object expected to exist was not found
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Create raced with another writer
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// Object exists but is not owned by the cluster being reconciled
    #[error("{kind} {name} is foreign owned")]
    ForeignOwned { kind: String, name: String },

    /// A precondition such as replica readiness is not met yet
    #[error("not ready: {0}")]
    NotReady(String),

    /// Replicas scheduled for removal still hold data
    #[error("waiting for {pending:?} to drain before scaling {node_pool} to {replicas}")]
    DrainIncomplete {
        node_pool: String,
        replicas: i32,
        pending: Vec<String>,
    },

    /// Spec or live object violates an invariant the controller relies on
    #[error("invalid: {0}")]
    Invalid(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ForeignOwned { .. } | Error::Invalid(_) | Error::Serialization(_) => {
                ErrorClass::Fatal
            }
            Error::Kube(_)
            | Error::NotFound { .. }
            | Error::AlreadyExists { .. }
            | Error::NotReady(_)
            | Error::DrainIncomplete { .. } => ErrorClass::Retryable,
        }
    }

    /// Short machine-readable reason, used for Warning events.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Kube(_) => "ApiError",
            Error::NotFound { .. } => "NotFound",
            Error::AlreadyExists { .. } => "AlreadyExists",
            Error::ForeignOwned { .. } => "ErrResourceExists",
            Error::NotReady(_) => "NotReady",
            Error::DrainIncomplete { .. } => "DrainIncomplete",
            Error::Invalid(_) => "InvalidSpec",
            Error::Serialization(_) => "SerializationError",
        }
    }
}
