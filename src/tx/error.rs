//! Transaction error types.

use thiserror::Error;

/// Result type for guarded transaction operations.
pub type TxResult<T, E> = Result<T, TxError<E>>;

/// Errors from the guarded transaction layer.
///
/// Every variant wraps the driver's own error as its source; this layer
/// adds which lifecycle step failed, nothing more. No retries happen here,
/// the error reaches the caller as soon as the driver reports it.
#[derive(Debug, Error)]
pub enum TxError<E>
where
    E: std::error::Error + 'static,
{
    /// Opening the underlying connection failed.
    #[error("failed to open connection: {0}")]
    Open(#[source] E),

    /// The driver's begin call failed; no transaction was created.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] E),

    /// The driver's commit call failed. The auto-rollback guard is already
    /// cancelled and after-commit hooks have not run.
    #[error("commit failed: {0}")]
    Commit(#[source] E),

    /// The driver's rollback call failed. The transaction is terminal
    /// regardless.
    #[error("rollback failed: {0}")]
    Rollback(#[source] E),
}

impl<E> TxError<E>
where
    E: std::error::Error + 'static,
{
    /// Check if this error came from a failed commit.
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, TxError::Commit(_))
    }

    /// Check if this error came from a failed rollback (explicit or
    /// auto-rollback).
    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, TxError::Rollback(_))
    }

    /// Recover the driver error this wraps.
    pub fn into_source(self) -> E {
        match self {
            TxError::Open(e) | TxError::Begin(e) | TxError::Commit(e) | TxError::Rollback(e) => e,
        }
    }
}
