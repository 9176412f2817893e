//! Errors surfaced by the reconcile loop to its caller.

use thiserror::Error;

use crate::store::StoreError;

/// Provider failures never show up here; the loop records them in the
/// resource status. What remains are store failures the loop could not
/// work around.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{name}: gave up after {attempts} conflicting writes")]
    ConflictRetriesExhausted { name: String, attempts: u32 },
}

impl ReconcileError {
    /// Worth requeueing with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::ConflictRetriesExhausted { .. } => true,
            ReconcileError::Store(StoreError::Internal(_)) => true,
            ReconcileError::Store(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
