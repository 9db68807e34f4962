//! Applies already-diffed write models to MongoDB, classifying every
//! failure so the caller can decide between retrying and giving up.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::Collection;
use thiserror::Error;
use twin_kernel::domain::write_model::WriteModel;

use crate::document::to_bson_document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied (or the patch's revision filter no longer
    /// matched, which the caller treats as "someone else already moved this
    /// twin forward" rather than an error).
    Applied,
    /// A `Patch`'s optimistic-concurrency filter did not match any document;
    /// the caller should fall back to a full `Put` on the next round.
    Conflict,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("transient mongo error: {0}")]
    Transient(#[source] mongodb::error::Error),
    #[error("permanent mongo error: {0}")]
    Permanent(#[source] mongodb::error::Error),
    #[error("document could not be encoded as bson: {0}")]
    Encoding(#[from] mongodb::bson::ser::Error),
}

impl WriteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WriteError::Transient(_))
    }
}

fn classify(err: mongodb::error::Error) -> WriteError {
    if err.is_network_error() {
        WriteError::Transient(err)
    } else {
        WriteError::Permanent(err)
    }
}

/// The write port the bulk queue drains through. Exists so the flush-trigger
/// logic in `BulkQueue` can be unit-tested against a fake without a live
/// MongoDB connection.
#[async_trait]
pub trait PartitionWriter: Send + Sync {
    async fn write_one(&self, model: &WriteModel<serde_json::Value>) -> Result<WriteOutcome, WriteError>;
}

#[derive(Debug, Clone)]
pub struct BulkWriterConfig {
    pub max_retries: u32,
}

impl Default for BulkWriterConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

pub struct BulkWriter {
    collection: Collection<Document>,
    config: BulkWriterConfig,
}

impl BulkWriter {
    pub fn new(collection: Collection<Document>, config: BulkWriterConfig) -> Self {
        Self { collection, config }
    }

    /// Writes a single model, retrying transient errors up to `max_retries`
    /// times with no caller-visible backoff (the caller's bulk queue owns
    /// the flush cadence this sits inside).
    pub async fn write_one_with_retry(
        &self,
        model: &WriteModel<serde_json::Value>,
    ) -> Result<WriteOutcome, WriteError> {
        let mut attempt = 0;
        loop {
            match self.write_one(model).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn write_partition(
        &self,
        models: &[WriteModel<serde_json::Value>],
    ) -> Vec<(WriteModel<serde_json::Value>, Result<WriteOutcome, WriteError>)> {
        let mut results = Vec::with_capacity(models.len());
        for model in models {
            let outcome = self.write_one_with_retry(model).await;
            results.push((model.clone(), outcome));
        }
        results
    }
}

#[async_trait]
impl PartitionWriter for BulkWriter {
    async fn write_one(&self, model: &WriteModel<serde_json::Value>) -> Result<WriteOutcome, WriteError> {
        match model {
            WriteModel::Delete(metadata) => {
                let filter = doc! { "_id": metadata.twin_id.to_string() };
                self.collection
                    .delete_one(filter)
                    .await
                    .map_err(classify)?;
                Ok(WriteOutcome::Applied)
            }
            WriteModel::Put(metadata, document) => {
                let filter = doc! { "_id": metadata.twin_id.to_string() };
                let bson_doc = to_bson_document(document)?;
                self.collection
                    .replace_one(filter, bson_doc)
                    .upsert(true)
                    .await
                    .map_err(classify)?;
                Ok(WriteOutcome::Applied)
            }
            WriteModel::Patch(metadata, patch, filter_revision) => {
                let filter = doc! {
                    "_id": metadata.twin_id.to_string(),
                    "_revision": filter_revision.0,
                };
                let update_doc = to_bson_document(patch)?;
                let result = self
                    .collection
                    .update_one(filter, update_doc)
                    .await
                    .map_err(classify)?;
                if result.matched_count == 0 {
                    Ok(WriteOutcome::Conflict)
                } else {
                    Ok(WriteOutcome::Applied)
                }
            }
        }
    }
}
