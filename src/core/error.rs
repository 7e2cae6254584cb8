//! Error types for dispatch operations.

use thiserror::Error;

/// Errors produced by the queue, ledger, registry and facade.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The admission queue (or the target bucket) stayed full for the whole
    /// blocking window. Retryable by the caller.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// The requested model is not registered.
    #[error("Invalid model - {name}; available models are [{available}]")]
    UnknownModel {
        /// Model name from the request.
        name: String,
        /// Comma separated list of registered models.
        available: String,
    },
    /// A compute function faulted for this input.
    #[error("computation error: {0}")]
    Computation(String),
    /// The request payload could not be interpreted.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// Storage fault; the single operation was rolled back.
    #[error("DB issue ({context}) - {source}")]
    Persistence {
        /// Ledger operation that failed.
        context: String,
        /// Underlying storage error.
        #[source]
        source: sqlx::Error,
    },
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The service or pool has been shut down.
    #[error("service has been shut down")]
    Shutdown,
    /// Internal failure (worker spawn, blocking task join).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`DispatchError`], used for logging.
///
/// The client-facing `retcode` stays binary; this enum only exists so the
/// service can tell causes apart internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Admission rejected, retry later.
    Backpressure,
    /// Bad request, permanent until the payload changes.
    BadRequest,
    /// Compute fault, permanent for this input.
    Computation,
    /// Storage fault.
    Persistence,
    /// Lifecycle or configuration problem.
    Service,
}

impl DispatchError {
    /// Wrap a storage error with the name of the ledger operation.
    pub fn persistence(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Persistence {
            context: context.into(),
            source,
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::QueueFull(_) => ErrorKind::Backpressure,
            Self::UnknownModel { .. } | Self::InvalidPayload(_) => ErrorKind::BadRequest,
            Self::Computation(_) => ErrorKind::Computation,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::InvalidConfig(_) | Self::Shutdown | Self::Internal(_) => ErrorKind::Service,
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Backpressure | ErrorKind::Persistence)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
