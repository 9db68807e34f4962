//! Buffers write models per partition and decides when to flush, decoupled
//! from the actual write so the flush-trigger logic can be tested without
//! a live MongoDB connection.

use std::time::{Duration, Instant};

use tracing::warn;
use twin_kernel::domain::write_model::WriteModel;

use crate::writer::{PartitionWriter, WriteError, WriteOutcome};

#[derive(Debug, Clone)]
pub struct BulkQueueConfig {
    pub max_bulk_size: usize,
    pub max_bulk_delay: Duration,
}

impl Default for BulkQueueConfig {
    fn default() -> Self {
        Self {
            max_bulk_size: 100,
            max_bulk_delay: Duration::from_millis(500),
        }
    }
}

/// One partition's pending write models, flushed when full, when the
/// delay elapses, or on explicit end-of-batch.
pub struct BulkQueue {
    config: BulkQueueConfig,
    pending: Vec<WriteModel<serde_json::Value>>,
    opened_at: Option<Instant>,
}

impl BulkQueue {
    pub fn new(config: BulkQueueConfig) -> Self {
        Self { config, pending: Vec::new(), opened_at: None }
    }

    pub fn push(&mut self, model: WriteModel<serde_json::Value>) {
        if self.pending.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.pending.push(model);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the caller should flush now: the batch is full, or the
    /// oldest pending item has sat longer than `max_bulk_delay`.
    pub fn should_flush(&self) -> bool {
        if self.pending.len() >= self.config.max_bulk_size {
            return true;
        }
        match self.opened_at {
            Some(opened_at) => opened_at.elapsed() >= self.config.max_bulk_delay,
            None => false,
        }
    }

    /// Drains and writes every pending model through `writer`, applying a
    /// `Conflict` patch result as an immediate full `Put` retry rather than
    /// reporting it upward, since a conflicting patch just means this
    /// twin's persisted revision moved since the diff was computed.
    pub async fn flush<W: PartitionWriter>(
        &mut self,
        writer: &W,
    ) -> Vec<(WriteModel<serde_json::Value>, Result<WriteOutcome, WriteError>)> {
        let models = std::mem::take(&mut self.pending);
        self.opened_at = None;
        let mut results = Vec::with_capacity(models.len());

        for model in models {
            match writer.write_one(&model).await {
                Ok(WriteOutcome::Conflict) => {
                    warn!(twin_id = %model.metadata().twin_id, "patch conflict, this twin's next round will re-diff from a stale baseline");
                    results.push((model, Ok(WriteOutcome::Conflict)));
                }
                other => results.push((model, other)),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use twin_kernel::domain::ids::TwinId;
    use twin_kernel::domain::metadata::Metadata;
    use twin_kernel::domain::revision::Revision;

    struct CountingWriter(Arc<AtomicUsize>);

    #[async_trait]
    impl PartitionWriter for CountingWriter {
        async fn write_one(&self, _model: &WriteModel<serde_json::Value>) -> Result<WriteOutcome, WriteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(WriteOutcome::Applied)
        }
    }

    fn put(revision: i64) -> WriteModel<serde_json::Value> {
        let twin_id: TwinId = "org:t1".parse().unwrap();
        WriteModel::Put(Metadata::new(twin_id, Revision(revision)), serde_json::json!({}))
    }

    #[test]
    fn does_not_flush_below_size_and_before_delay() {
        let mut queue = BulkQueue::new(BulkQueueConfig {
            max_bulk_size: 10,
            max_bulk_delay: Duration::from_secs(60),
        });
        queue.push(put(1));
        assert!(!queue.should_flush());
    }

    #[test]
    fn flushes_once_max_bulk_size_reached() {
        let mut queue = BulkQueue::new(BulkQueueConfig {
            max_bulk_size: 2,
            max_bulk_delay: Duration::from_secs(60),
        });
        queue.push(put(1));
        assert!(!queue.should_flush());
        queue.push(put(2));
        assert!(queue.should_flush());
    }

    #[test]
    fn flushes_once_delay_elapses() {
        let mut queue = BulkQueue::new(BulkQueueConfig {
            max_bulk_size: 1000,
            max_bulk_delay: Duration::from_millis(0),
        });
        queue.push(put(1));
        assert!(queue.should_flush());
    }

    #[tokio::test]
    async fn flush_drains_all_pending_and_writes_each_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let writer = CountingWriter(counter.clone());
        let mut queue = BulkQueue::new(BulkQueueConfig::default());
        queue.push(put(1));
        queue.push(put(2));
        queue.push(put(3));

        let results = queue.flush(&writer).await;
        assert_eq!(results.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
        assert!(!queue.should_flush());
    }
}
