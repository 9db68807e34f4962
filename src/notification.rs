//! Inbound change notifications: the shape delivered over the cluster bus,
//! and their translation into the twin update task's mailbox messages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use twin_kernel::domain::event::Event;
use twin_kernel::domain::ids::{PolicyId, TwinId};
use twin_kernel::domain::revision::Revision;
use twin_updater::Message;

/// `{ twinId, thingRevision, policyId?, policyRevision?, events, updateReasons,
/// invalidateThing, invalidatePolicy }`, delivered at-most-once; the pipeline
/// guarantees idempotence itself via revision gating, so redelivery is safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub twin_id: TwinId,
    pub thing_revision: Revision,
    pub policy_id: Option<PolicyId>,
    pub policy_revision: Option<Revision>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub update_reasons: BTreeSet<String>,
    #[serde(default)]
    pub invalidate_thing: bool,
    #[serde(default)]
    pub invalidate_policy: bool,
}

impl ChangeNotification {
    /// Expands this notification into the ordered sequence of mailbox
    /// messages the twin's task should receive. A manual-reindex reason
    /// still carries its events (if any) alongside the force-update flag.
    pub fn into_messages(self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.events.into_iter().map(Message::TwinEvent).collect();

        if let (Some(policy_id), Some(policy_revision)) = (self.policy_id, self.policy_revision) {
            if self.invalidate_policy {
                messages.push(Message::PolicyChanged { policy_id, policy_revision });
            }
        }

        if self.update_reasons.contains("MANUAL_REINDEXING") {
            messages.push(Message::ManualUpdate);
        }
        if self.update_reasons.contains("SYNC") {
            messages.push(Message::Sync);
        }

        messages
    }
}
