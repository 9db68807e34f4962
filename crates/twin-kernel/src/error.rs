//! Error kinds observable at the pipeline boundary.
//!
//! These are intentionally coarse — each downstream crate narrows them into
//! its own `thiserror` enum and converts back to `PipelineError` only at the
//! composition root.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// MongoDB timeout, cluster ask timeout: retried with backoff, never surfaces.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Patch filter mismatch: handled internally by forcing a full `Put`.
    #[error("optimistic concurrency conflict at revision {0}")]
    OptimisticConflict(crate::domain::revision::Revision),

    /// Malformed JSON, invalid namespaced id, invalid policy id.
    #[error("validation error: {0}")]
    Validation(String),

    /// No twin, no policy, no enforcer: treated as "delete from search index".
    #[error("missing entity: {0}")]
    MissingEntity(String),

    /// MongoDB permanent rejection (duplicate key not reconcilable).
    #[error("permanent persistence error: {0}")]
    PermanentPersistence(String),

    /// Cooperative shutdown in progress; no retries attempted.
    #[error("shutting down")]
    ShuttingDown,
}

pub type PipelineResult<T> = Result<T, PipelineError>;
