//! Errors returned by engine operations.

use crate::clients::OracleError;
use crate::model::Currency;
use crate::rules::Eligibility;
use crate::storage::StorageError;
use crate::utils::retry::is_retryable_storage;

/// Outcome taxonomy exposed to the request layer.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Missing idempotency key")]
    MissingIdempotencyKey,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Action unavailable ({:?}) until {}", .0.reason, .0.next_available_at)]
    ActionUnavailable(Eligibility),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Insufficient {0} balance")]
    InsufficientBalance(Currency),

    #[error("External dependency unavailable: {0}")]
    ExternalDependencyUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::MissingIdempotencyKey => "missing_idempotency_key",
            ActionError::Unauthenticated => "unauthenticated",
            ActionError::Validation(_) => "validation_error",
            ActionError::PreconditionFailed(_) => "precondition_failed",
            ActionError::ActionUnavailable(_) => "action_unavailable",
            ActionError::Conflict(_) => "conflict",
            ActionError::NotFound(_) => "not_found",
            ActionError::RateLimited { .. } => "rate_limited",
            ActionError::InsufficientBalance(_) => "insufficient_balance",
            ActionError::ExternalDependencyUnavailable(_) => "external_dependency_unavailable",
            ActionError::Internal(_) => "internal",
        }
    }

    /// Whether repeating the request (with the same idempotency key) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::RateLimited { .. }
                | ActionError::ExternalDependencyUnavailable(_)
                | ActionError::Internal(_)
        )
    }
}

impl From<StorageError> for ActionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InsufficientBalance(currency) => ActionError::InsufficientBalance(currency),
            StorageError::MissionAlreadyCompleted(id) => {
                ActionError::Conflict(format!("mission {id} already completed"))
            }
            other => ActionError::Internal(other.to_string()),
        }
    }
}

impl From<OracleError> for ActionError {
    fn from(err: OracleError) -> Self {
        ActionError::ExternalDependencyUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ActionError>;

/// Failure of one optimistic attempt inside the engine.
#[derive(Debug)]
pub(crate) enum Attempt {
    /// Wake state moved underneath us; re-read and try again.
    Stale,
    Fail(ActionError),
}

impl From<ActionError> for Attempt {
    fn from(err: ActionError) -> Self {
        Attempt::Fail(err)
    }
}

impl From<StorageError> for Attempt {
    fn from(err: StorageError) -> Self {
        if is_retryable_storage(&err) {
            Attempt::Stale
        } else {
            Attempt::Fail(err.into())
        }
    }
}
