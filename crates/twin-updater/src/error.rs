//! Errors surfaced by a twin update task's own setup; runtime failures
//! (fetch, write) are handled internally and never propagate out of `run`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("recovery failed: {0}")]
    Recovery(#[from] crate::recovery::RecoveryError),
}
