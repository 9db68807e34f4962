//! Recovery: loading the last durably written search-index document for a
//! twin id before the task starts accepting mailbox traffic.

use async_trait::async_trait;
use search_index::PersistedState;
use twin_kernel::domain::ids::TwinId;

#[derive(Debug, thiserror::Error)]
#[error("failed to recover last write model for twin: {0}")]
pub struct RecoveryError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

/// The recovery port: resolves to `None` when the twin has no prior
/// persisted document (first write will be a full `Put`).
#[async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn load(&self, twin_id: &TwinId) -> Result<Option<PersistedState>, RecoveryError>;
}

/// A recovery store backed by nothing: every task starts as if it had
/// never persisted anything. Useful for tests and for deployments that
/// accept re-deriving `lastModel` via the first full fetch.
pub struct NoRecovery;

#[async_trait]
impl RecoveryStore for NoRecovery {
    async fn load(&self, _twin_id: &TwinId) -> Result<Option<PersistedState>, RecoveryError> {
        Ok(None)
    }
}
