//! The enforcement flow: turns one flush window's accumulated per-twin
//! metadata into write models, partitioned for the bulk writer.

use crate::partition::partition_of;
use entity_cache::Entry;
use enrichment::EnrichmentFacade;
use futures_util::stream::{self, StreamExt};
use policy_enforcer::PolicyEnforcerCache;
use std::collections::HashMap;
use tracing::warn;
use twin_kernel::domain::event::latest_event;
use twin_kernel::domain::ids::{PolicyId, TwinId};
use twin_kernel::domain::metadata::Metadata;
use twin_kernel::domain::revision::Revision;
use twin_kernel::domain::write_model::WriteModel;

#[derive(Debug, Clone)]
pub struct EnforcementConfig {
    pub max_array_size: usize,
    pub parallelism: usize,
    pub partitions: usize,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            max_array_size: 100,
            parallelism: 8,
            partitions: 8,
        }
    }
}

/// Runs one flush window's worth of accumulated metadata through the
/// enforcement flow, returning write models grouped by
/// `|hash(twinId)| mod partitions`.
pub async fn run_enforcement_round(
    batch: HashMap<TwinId, Metadata>,
    facade: &EnrichmentFacade,
    policies: &PolicyEnforcerCache,
    config: &EnforcementConfig,
) -> Vec<Vec<WriteModel<serde_json::Value>>> {
    let partition_count = config.partitions.max(1);
    let mut partitioned = vec![Vec::new(); partition_count];

    let results: Vec<(usize, Option<WriteModel<serde_json::Value>>)> = stream::iter(batch.into_iter())
        .map(|(twin_id, metadata)| async move {
            let partition = partition_of(&twin_id, partition_count);
            let model = process_twin(twin_id, metadata, facade, policies, config).await;
            (partition, model)
        })
        .buffer_unordered(config.parallelism.max(1))
        .collect()
        .await;

    for (partition, model) in results {
        if let Some(model) = model {
            partitioned[partition].push(model);
        }
    }
    partitioned
}

/// Processes a single twin's accumulated metadata.
///
/// Returns `None` when a transient fetch failure means this twin should be
/// silently skipped this round (retried once its next event arrives) —
/// never poisoning the rest of the batch. Every other outcome (including
/// "twin no longer exists" and "policy/enforcer missing") resolves to a
/// concrete write model.
async fn process_twin(
    twin_id: TwinId,
    metadata: Metadata,
    facade: &EnrichmentFacade,
    policies: &PolicyEnforcerCache,
    config: &EnforcementConfig,
) -> Option<WriteModel<serde_json::Value>> {
    let expected_revision = baseline_revision(&metadata);

    let json = match facade.retrieve_thing(&twin_id, &metadata.events, expected_revision).await {
        Ok(json) => json,
        Err(err) => {
            warn!(%twin_id, error = %err, "enrichment fetch failed, skipping twin this round");
            return None;
        }
    };

    let Some(json) = json else {
        return Some(WriteModel::Delete(metadata));
    };

    if let Some(latest) = latest_event(&metadata.events) {
        if latest.kind.is_deleted() {
            return Some(WriteModel::Delete(metadata));
        }
    }

    let Some(policy_id) = policy_id_of(&metadata, &json) else {
        return Some(WriteModel::Delete(metadata));
    };

    let required_revision = metadata.policy_revision.unwrap_or(Revision::UNKNOWN);
    let enforcer_entry = match policies.get(&policy_id, required_revision, metadata.invalidate_policy).await {
        Ok(entry) => entry,
        Err(err) => {
            warn!(%twin_id, %policy_id, error = %err, "policy enforcer cache failed, treating as nonexistent enforcer");
            Entry::missing()
        }
    };

    let enforcer_exists = enforcer_entry.exists;
    let Some(enforcer) = enforcer_entry.value.filter(|_| enforcer_exists) else {
        return Some(WriteModel::Delete(metadata));
    };

    let subjects = enforcer.all_read_grant_subjects();
    let mut projected = enforcer.project(&subjects, "thing", &json);
    crate::bound::bound_arrays(&mut projected, config.max_array_size);

    Some(WriteModel::Put(metadata, projected))
}

/// The revision the enrichment facade should expect the cached snapshot to
/// be at before applying this round's events. Derived as one less than the
/// oldest known event's revision; `Revision::UNKNOWN` when there are no
/// events to apply incrementally (forcing a full fetch).
fn baseline_revision(metadata: &Metadata) -> Revision {
    metadata
        .events
        .iter()
        .map(|e| e.revision)
        .min()
        .map(|oldest| Revision(oldest.0 - 1))
        .unwrap_or(Revision::UNKNOWN)
}

fn policy_id_of(metadata: &Metadata, json: &serde_json::Value) -> Option<PolicyId> {
    metadata.policy_id.clone().or_else(|| {
        json.get("policyId")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
    })
}
