//! The search-index write-model differ and bulk writer: turns enforcement-flow
//! output into minimal MongoDB operations (drop/patch/put) and applies them
//! with per-document error classification.

mod document;
mod differ;
mod queue;
mod writer;

pub use document::{assemble_persisted_document, to_bson_document};
pub use differ::{diff, PersistedState};
pub use queue::{BulkQueue, BulkQueueConfig};
pub use writer::{BulkWriter, BulkWriterConfig, PartitionWriter, WriteError, WriteOutcome};
