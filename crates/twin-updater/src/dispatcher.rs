//! Routes inbound notifications to the one cooperative task that owns a
//! given twin id, spawning that task on first sight and reaping it once
//! its mailbox closes or it self-terminates.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::error;

use enrichment::EnrichmentFacade;
use policy_enforcer::PolicyEnforcerCache;
use search_index::PartitionWriter;
use twin_kernel::domain::ids::TwinId;

use crate::message::Message;
use crate::recovery::RecoveryStore;
use crate::task::{TwinUpdateConfig, TwinUpdateTask};

const MAILBOX_CAPACITY: usize = 256;

pub struct Dispatcher<W: PartitionWriter> {
    senders: Arc<DashMap<TwinId, mpsc::Sender<Message>>>,
    facade: Arc<EnrichmentFacade>,
    policies: Arc<PolicyEnforcerCache>,
    writer: Arc<W>,
    recovery: Arc<dyn RecoveryStore>,
    config: TwinUpdateConfig,
}

impl<W: PartitionWriter + 'static> Dispatcher<W> {
    pub fn new(
        facade: Arc<EnrichmentFacade>,
        policies: Arc<PolicyEnforcerCache>,
        writer: Arc<W>,
        recovery: Arc<dyn RecoveryStore>,
        config: TwinUpdateConfig,
    ) -> Self {
        Self {
            senders: Arc::new(DashMap::new()),
            facade,
            policies,
            writer,
            recovery,
            config,
        }
    }

    /// Delivers `message` to the twin's task, spawning it first if this is
    /// the first message seen for `twin_id`.
    pub async fn dispatch(&self, twin_id: TwinId, message: Message) {
        let existing = self.senders.get(&twin_id).map(|e| e.clone());
        if let Some(sender) = existing {
            if sender.send(message.clone()).await.is_ok() {
                return;
            }
        }
        self.spawn_and_send(twin_id, message).await;
    }

    async fn spawn_and_send(&self, twin_id: TwinId, message: Message) {
        let (tx, mut rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.senders.insert(twin_id.clone(), tx.clone());

        let facade = self.facade.clone();
        let policies = self.policies.clone();
        let writer = self.writer.clone();
        let recovery = self.recovery.clone();
        let config = self.config.clone();
        let senders = self.senders.clone();
        let spawned_id = twin_id.clone();

        tokio::spawn(async move {
            match TwinUpdateTask::recover(spawned_id.clone(), config, facade, policies, writer, recovery.as_ref()).await {
                Ok(mut task) => task.run(&mut rx).await,
                Err(err) => error!(twin_id = %spawned_id, error = %err, "failed to recover twin update task"),
            }
            senders.remove(&spawned_id);
        });

        if tx.send(message).await.is_err() {
            error!(%twin_id, "twin update task mailbox closed immediately after spawn");
        }
    }

    /// Broadcasts `Shutdown` to every live task. Callers typically await a
    /// grace period afterward before exiting the process.
    pub async fn shutdown_all(&self) {
        let live: Vec<_> = self.senders.iter().map(|e| e.value().clone()).collect();
        for sender in live {
            let _ = sender.send(Message::Shutdown).await;
        }
    }

    pub fn live_twin_count(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::NoRecovery;
    use async_trait::async_trait;
    use chrono::Utc;
    use entity_cache::{Entry, LoaderError};
    use policy_enforcer::{Permission, Policy, PolicyEntry, PolicyLoader, ResourceTarget};
    use search_index::WriteError;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use twin_kernel::domain::event::{Event, EventKind};
    use twin_kernel::domain::revision::Revision;
    use twin_kernel::domain::twin::Twin;
    use twin_kernel::domain::write_model::WriteModel;

    struct FixedThingFetcher;

    #[async_trait]
    impl enrichment::ThingFetcher for FixedThingFetcher {
        async fn fetch_thing(&self, twin_id: &TwinId) -> Result<Entry<Twin>, LoaderError> {
            Ok(Entry::found(
                Revision(1),
                Twin {
                    twin_id: twin_id.clone(),
                    policy_id: Some("org:p1".parse().unwrap()),
                    revision: Revision(1),
                    attributes: serde_json::json!({}),
                    features: BTreeMap::new(),
                    modified: Utc::now(),
                    metadata: serde_json::Value::Null,
                },
            ))
        }
    }

    struct FixedPolicyLoader;

    #[async_trait]
    impl PolicyLoader for FixedPolicyLoader {
        async fn load_policy(&self, policy_id: &twin_kernel::domain::ids::PolicyId) -> Result<Entry<Policy>, LoaderError> {
            let policy = Policy::new(policy_id.clone(), Revision(1)).with_entry(PolicyEntry {
                subjects: BTreeSet::from(["user:alice".to_string()]),
                grants: BTreeSet::from([Permission::Read]),
                revokes: BTreeSet::new(),
                targets: vec![ResourceTarget::new("thing", "/")],
            });
            Ok(Entry::found(Revision(1), policy))
        }
    }

    struct CountingWriter(AtomicUsize);

    #[async_trait]
    impl PartitionWriter for CountingWriter {
        async fn write_one(&self, _model: &WriteModel<serde_json::Value>) -> Result<search_index::WriteOutcome, WriteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(search_index::WriteOutcome::Applied)
        }
    }

    fn event(revision: i64) -> Event {
        Event {
            twin_id: "org:t1".parse().unwrap(),
            revision: Revision(revision),
            timestamp: Utc::now(),
            kind: EventKind::Modified,
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn dispatch_spawns_one_task_per_twin_and_reaps_it_on_shutdown() {
        let facade = Arc::new(EnrichmentFacade::new(Arc::new(FixedThingFetcher), 10, Duration::from_secs(60)));
        let policies = Arc::new(PolicyEnforcerCache::new(Arc::new(FixedPolicyLoader), 10, Duration::from_secs(60), Duration::from_millis(0)));
        let writer = Arc::new(CountingWriter(AtomicUsize::new(0)));
        let dispatcher = Dispatcher::new(facade, policies, writer.clone(), Arc::new(NoRecovery), TwinUpdateConfig::default());

        dispatcher.dispatch("org:t1".parse().unwrap(), Message::TwinEvent(event(1))).await;
        dispatcher.dispatch("org:t2".parse().unwrap(), Message::TwinEvent(event(1))).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.live_twin_count(), 2);
        assert_eq!(writer.0.load(Ordering::SeqCst), 2);

        dispatcher.shutdown_all().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.live_twin_count(), 0);
    }
}
