//! Accumulated-change metadata carried through the pipeline.

use crate::domain::event::Event;
use crate::domain::ids::{PolicyId, TwinId};
use crate::domain::revision::Revision;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Why a write was triggered; used for observability and to decide whether
/// a policy-change round needs a cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdateReason {
    TwinEvent,
    PolicyUpdate,
    ManualReindexing,
    Sync,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub twin_id: TwinId,
    pub thing_revision: Revision,
    pub policy_id: Option<PolicyId>,
    pub policy_revision: Option<Revision>,
    pub events: Vec<Event>,
    #[serde(skip, default)]
    pub timers: Vec<Duration>,
    pub update_reasons: BTreeSet<UpdateReason>,
    pub invalidate_thing: bool,
    pub invalidate_policy: bool,
}

impl Metadata {
    pub fn new(twin_id: TwinId, thing_revision: Revision) -> Self {
        Self {
            twin_id,
            thing_revision,
            policy_id: None,
            policy_revision: None,
            events: Vec::new(),
            timers: Vec::new(),
            update_reasons: BTreeSet::new(),
            invalidate_thing: false,
            invalidate_policy: false,
        }
    }

    /// Merges another metadata batch into this one: preserves the highest
    /// revision and the union of `updateReasons`.
    pub fn merge(&mut self, other: Metadata) {
        if other.thing_revision > self.thing_revision {
            self.thing_revision = other.thing_revision;
        }
        self.events.extend(other.events);
        self.update_reasons.extend(other.update_reasons);
        self.invalidate_thing |= other.invalidate_thing;
        self.invalidate_policy |= other.invalidate_policy;
        if other.policy_id.is_some() {
            self.policy_id = other.policy_id;
        }
        if other.policy_revision.is_some() {
            self.policy_revision = other.policy_revision;
        }
    }
}
