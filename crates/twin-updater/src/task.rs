//! The twin update task: a cooperative, single-owner state machine per
//! twin id. One `TwinUpdateTask::run` call owns exactly one twin for its
//! entire lifetime; different twins' tasks never share mutable state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use enforcement_flow::EnforcementConfig;
use enrichment::EnrichmentFacade;
use policy_enforcer::PolicyEnforcerCache;
use search_index::{self, PartitionWriter, PersistedState, WriteOutcome};
use twin_kernel::domain::ids::TwinId;
use twin_kernel::domain::metadata::{Metadata, UpdateReason};
use twin_kernel::domain::write_model::WriteModel;

use crate::error::TaskError;
use crate::message::Message;
use crate::recovery::RecoveryStore;
use crate::state::TaskState;

#[derive(Debug, Clone)]
pub struct TwinUpdateConfig {
    pub idle_timeout: Duration,
    pub drain_timeout: Duration,
    pub max_retries: u32,
    pub patch_size_threshold: usize,
    /// Bound on events merged while `Persisting`; exceeding it drops the
    /// stash and forces a full refresh on the next round.
    pub max_stash_events: usize,
    pub enforcement: EnforcementConfig,
}

impl Default for TwinUpdateConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            drain_timeout: Duration::from_secs(30),
            max_retries: 3,
            patch_size_threshold: 4096,
            max_stash_events: 1000,
            enforcement: EnforcementConfig::default(),
        }
    }
}

pub struct TwinUpdateTask<W: PartitionWriter> {
    twin_id: TwinId,
    state: TaskState,
    pending: Option<Metadata>,
    force_update: bool,
    last_model: Option<PersistedState>,
    config: TwinUpdateConfig,
    facade: Arc<EnrichmentFacade>,
    policies: Arc<PolicyEnforcerCache>,
    writer: Arc<W>,
}

impl<W: PartitionWriter> TwinUpdateTask<W> {
    pub async fn recover(
        twin_id: TwinId,
        config: TwinUpdateConfig,
        facade: Arc<EnrichmentFacade>,
        policies: Arc<PolicyEnforcerCache>,
        writer: Arc<W>,
        recovery: &dyn RecoveryStore,
    ) -> Result<Self, TaskError> {
        let last_model = recovery.load(&twin_id).await?;
        info!(%twin_id, recovered = last_model.is_some(), "twin update task recovered");
        Ok(Self {
            twin_id,
            state: TaskState::Ready,
            pending: None,
            force_update: false,
            last_model,
            config,
            facade,
            policies,
            writer,
        })
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Drives the mailbox to completion: either the idle timeout elapses
    /// with nothing pending, or a `Shutdown` message is cooperatively
    /// drained. Returns normally in both cases.
    pub async fn run(&mut self, mailbox: &mut tokio::sync::mpsc::Receiver<Message>) {
        loop {
            if matches!(self.state, TaskState::ShuttingDown) {
                return;
            }

            // Waiting here (rather than immediately re-attempting a round
            // whose enrichment fetch just failed) is what makes "a
            // subsequent event or periodic sync command triggers a fresh
            // attempt" true instead of a busy retry loop.
            let next = tokio::select! {
                msg = mailbox.recv() => Some(msg),
                _ = tokio::time::sleep(self.config.idle_timeout) => None,
            };

            match next {
                None => {
                    info!(twin_id = %self.twin_id, "idle timeout, self-terminating");
                    self.state = TaskState::ShuttingDown;
                    return;
                }
                Some(None) => {
                    info!(twin_id = %self.twin_id, "mailbox closed, shutting down");
                    self.state = TaskState::ShuttingDown;
                    return;
                }
                Some(Some(Message::Shutdown)) => {
                    self.shutdown(mailbox).await;
                    return;
                }
                Some(Some(msg)) => self.accumulate(msg),
            }

            if self.pending.is_some() {
                self.persist(mailbox).await;
            }
        }
    }

    fn accumulate(&mut self, msg: Message) {
        match msg {
            Message::TwinEvent(event) => {
                let mut metadata = Metadata::new(self.twin_id.clone(), event.revision);
                metadata.update_reasons.insert(UpdateReason::TwinEvent);
                metadata.events.push(event);
                self.merge_pending(metadata);
            }
            Message::PolicyChanged { policy_id, policy_revision } => {
                let mut metadata = Metadata::new(
                    self.twin_id.clone(),
                    self.last_model.as_ref().map(|m| m.revision).unwrap_or(twin_kernel::domain::revision::Revision::UNKNOWN),
                );
                metadata.policy_id = Some(policy_id);
                metadata.policy_revision = Some(policy_revision);
                metadata.invalidate_policy = true;
                metadata.update_reasons.insert(UpdateReason::PolicyUpdate);
                self.merge_pending(metadata);
            }
            Message::ManualUpdate => {
                self.force_update = true;
                let mut metadata = Metadata::new(
                    self.twin_id.clone(),
                    self.last_model.as_ref().map(|m| m.revision).unwrap_or(twin_kernel::domain::revision::Revision::UNKNOWN),
                );
                metadata.update_reasons.insert(UpdateReason::ManualReindexing);
                self.merge_pending(metadata);
            }
            Message::Sync => {
                let mut metadata = Metadata::new(
                    self.twin_id.clone(),
                    self.last_model.as_ref().map(|m| m.revision).unwrap_or(twin_kernel::domain::revision::Revision::UNKNOWN),
                );
                metadata.update_reasons.insert(UpdateReason::Sync);
                self.merge_pending(metadata);
            }
            Message::Shutdown => unreachable!("handled by caller before accumulate"),
        }
    }

    fn merge_pending(&mut self, incoming: Metadata) {
        match &mut self.pending {
            Some(existing) => existing.merge(incoming),
            None => self.pending = Some(incoming),
        }

        if let Some(pending) = &mut self.pending {
            if pending.events.len() > self.config.max_stash_events {
                warn!(twin_id = %self.twin_id, stashed = pending.events.len(), "stash overflow, forcing full refresh and dropping stash");
                pending.events.clear();
                self.force_update = true;
            }
        }
    }

    /// Computes, diffs, and writes one round, retrying transient failures
    /// with bounded backoff and re-entering with `force-update` on a patch
    /// conflict. On give-up, reverts to `Ready` with `lastModel` unchanged.
    async fn persist(&mut self, mailbox: &mut tokio::sync::mpsc::Receiver<Message>) {
        self.state = TaskState::Persisting;
        let metadata = self.pending.take().expect("persist called with empty pending");

        let Some(write_model) = compute_write_model(&self.twin_id, metadata.clone(), &self.facade, &self.policies, &self.config.enforcement).await else {
            warn!(twin_id = %self.twin_id, "enrichment unavailable this round, will retry on next event");
            self.pending = Some(metadata);
            self.state = TaskState::Ready;
            return;
        };

        let target = target_state(&write_model);
        let mut previous = if self.force_update { None } else { self.last_model.clone() };
        self.force_update = false;

        let mut attempt = 0;
        loop {
            let Some(diffed) = search_index::diff(previous.as_ref(), &write_model, self.config.patch_size_threshold) else {
                self.last_model = target;
                self.state = TaskState::Ready;
                return;
            };

            match self.writer.write_one(&diffed).await {
                Ok(WriteOutcome::Applied) => {
                    self.last_model = target;
                    self.state = TaskState::Ready;
                    return;
                }
                Ok(WriteOutcome::Conflict) => {
                    info!(twin_id = %self.twin_id, "patch conflict, re-entering persist with force-update");
                    previous = None;
                    continue;
                }
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    self.state = TaskState::Retrying { attempt };
                    let backoff = backoff_for(attempt);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        msg = mailbox.recv() => {
                            if matches!(msg, Some(Message::Shutdown)) {
                                // shutdown drains the in-flight retry; keep retrying to completion.
                            }
                        }
                    }
                    self.state = TaskState::Persisting;
                    continue;
                }
                Err(err) => {
                    warn!(twin_id = %self.twin_id, error = %err, "persistence failed, reverting to ready with lastModel unchanged");
                    self.state = TaskState::Ready;
                    return;
                }
            }
        }
    }

    /// Cooperative shutdown: stop accepting new mailbox items, drain the
    /// in-flight persistence if one is running, then terminate.
    async fn shutdown(&mut self, mailbox: &mut tokio::sync::mpsc::Receiver<Message>) {
        info!(twin_id = %self.twin_id, state = ?self.state, "shutdown requested");
        if self.pending.is_some() {
            let drain = self.persist(mailbox);
            if tokio::time::timeout(self.config.drain_timeout, drain).await.is_err() {
                warn!(twin_id = %self.twin_id, "drain timed out during shutdown");
            }
        }
        self.state = TaskState::ShuttingDown;
    }
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(100u64.saturating_mul(1u64 << attempt.min(10)))
}

fn target_state(write_model: &WriteModel<serde_json::Value>) -> Option<PersistedState> {
    match write_model {
        WriteModel::Delete(_) => None,
        WriteModel::Put(metadata, projected) | WriteModel::Patch(metadata, projected, _) => {
            Some(PersistedState {
                document: search_index::assemble_persisted_document(metadata, projected),
                revision: metadata.thing_revision,
            })
        }
    }
}

async fn compute_write_model(
    twin_id: &TwinId,
    metadata: Metadata,
    facade: &EnrichmentFacade,
    policies: &PolicyEnforcerCache,
    config: &EnforcementConfig,
) -> Option<WriteModel<serde_json::Value>> {
    let mut batch = HashMap::new();
    batch.insert(twin_id.clone(), metadata);
    let partitions = enforcement_flow::run_enforcement_round(batch, facade, policies, config).await;
    partitions.into_iter().flatten().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use entity_cache::{Entry, LoaderError};
    use policy_enforcer::{Permission, Policy, PolicyEntry, PolicyLoader, ResourceTarget};
    use serde::ser::Error as _;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use twin_kernel::domain::event::{Event, EventKind};
    use twin_kernel::domain::revision::Revision;
    use twin_kernel::domain::twin::Twin;

    struct FixedThingFetcher(Mutex<Twin>);

    #[async_trait]
    impl enrichment::ThingFetcher for FixedThingFetcher {
        async fn fetch_thing(&self, _twin_id: &TwinId) -> Result<Entry<Twin>, LoaderError> {
            let twin = self.0.lock().unwrap().clone();
            Ok(Entry::found(twin.revision, twin))
        }
    }

    struct FixedPolicyLoader(Policy);

    #[async_trait]
    impl PolicyLoader for FixedPolicyLoader {
        async fn load_policy(&self, _policy_id: &twin_kernel::domain::ids::PolicyId) -> Result<Entry<Policy>, LoaderError> {
            Ok(Entry::found(self.0.revision, self.0.clone()))
        }
    }

    fn twin(revision: i64, temp: i64) -> Twin {
        Twin {
            twin_id: "org:t1".parse().unwrap(),
            policy_id: Some("org:p1".parse().unwrap()),
            revision: Revision(revision),
            attributes: serde_json::json!({"temp": temp}),
            features: BTreeMap::new(),
            modified: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    fn allow_all_policy() -> Policy {
        Policy::new("org:p1".parse().unwrap(), Revision(1)).with_entry(PolicyEntry {
            subjects: BTreeSet::from(["user:alice".to_string()]),
            grants: BTreeSet::from([Permission::Read]),
            revokes: BTreeSet::new(),
            targets: vec![ResourceTarget::new("thing", "/")],
        })
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

    struct AlwaysApplied(AtomicUsize);

    #[async_trait]
    impl PartitionWriter for AlwaysApplied {
        async fn write_one(&self, _model: &WriteModel<serde_json::Value>) -> Result<WriteOutcome, search_index::WriteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(WriteOutcome::Applied)
        }
    }

    struct ConflictThenApplied(AtomicUsize);

    #[async_trait]
    impl PartitionWriter for ConflictThenApplied {
        async fn write_one(&self, model: &WriteModel<serde_json::Value>) -> Result<WriteOutcome, search_index::WriteError> {
            let call = self.0.fetch_add(1, Ordering::SeqCst);
            match (call, model) {
                (0, WriteModel::Patch(_, _, _)) => Ok(WriteOutcome::Conflict),
                _ => Ok(WriteOutcome::Applied),
            }
        }
    }

    struct AlwaysFailsPermanently;

    #[async_trait]
    impl PartitionWriter for AlwaysFailsPermanently {
        async fn write_one(&self, _model: &WriteModel<serde_json::Value>) -> Result<WriteOutcome, search_index::WriteError> {
            let ser_err = mongodb::bson::ser::Error::custom("boom");
            Err(search_index::WriteError::Encoding(ser_err))
        }
    }

    fn facade_with(twin: Twin) -> Arc<EnrichmentFacade> {
        Arc::new(EnrichmentFacade::new(Arc::new(FixedThingFetcher(Mutex::new(twin))), 10, Duration::from_secs(60)))
    }

    fn policies_with(policy: Policy) -> Arc<PolicyEnforcerCache> {
        Arc::new(PolicyEnforcerCache::new(Arc::new(FixedPolicyLoader(policy)), 10, Duration::from_secs(60), Duration::from_millis(0)))
    }

    #[tokio::test]
    async fn first_round_with_no_prior_state_emits_full_put_and_applies() {
        let writer = Arc::new(AlwaysApplied(AtomicUsize::new(0)));
        let mut task = TwinUpdateTask::recover(
            "org:t1".parse().unwrap(),
            TwinUpdateConfig::default(),
            facade_with(twin(1, 21)),
            policies_with(allow_all_policy()),
            writer.clone(),
            &crate::recovery::NoRecovery,
        )
        .await
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        tx.send(Message::TwinEvent(event(1))).await.unwrap();
        drop(tx);

        task.run(&mut rx).await;
        assert_eq!(writer.0.load(Ordering::SeqCst), 1);
        assert!(task.last_model.is_some());
    }

    #[tokio::test]
    async fn conflicting_patch_forces_full_put_and_still_succeeds() {
        let writer = Arc::new(ConflictThenApplied(AtomicUsize::new(0)));
        let mut task = TwinUpdateTask::recover(
            "org:t1".parse().unwrap(),
            TwinUpdateConfig::default(),
            facade_with(twin(5, 21)),
            policies_with(allow_all_policy()),
            writer.clone(),
            &crate::recovery::NoRecovery,
        )
        .await
        .unwrap();
        // Seed a prior persisted state so the first diff attempt is a Patch.
        task.last_model = Some(PersistedState {
            document: search_index::assemble_persisted_document(
                &Metadata::new("org:t1".parse().unwrap(), Revision(4)),
                &serde_json::json!({"attributes": {"temp": 20}}),
            ),
            revision: Revision(4),
        });

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        tx.send(Message::TwinEvent(event(5))).await.unwrap();
        drop(tx);

        task.run(&mut rx).await;
        assert_eq!(writer.0.load(Ordering::SeqCst), 2);
        assert!(task.last_model.is_some());
    }

    #[tokio::test]
    async fn permanent_failure_reverts_to_ready_with_last_model_unchanged() {
        let writer = Arc::new(AlwaysFailsPermanently);
        let mut task = TwinUpdateTask::recover(
            "org:t1".parse().unwrap(),
            TwinUpdateConfig::default(),
            facade_with(twin(1, 21)),
            policies_with(allow_all_policy()),
            writer,
            &crate::recovery::NoRecovery,
        )
        .await
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        tx.send(Message::TwinEvent(event(1))).await.unwrap();
        drop(tx);

        task.run(&mut rx).await;
        assert!(task.last_model.is_none());
        assert_eq!(task.state(), TaskState::ShuttingDown);
    }
}
