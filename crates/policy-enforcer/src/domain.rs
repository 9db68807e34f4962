//! Logical policy model: a set of entries, each binding
//! `{ subjects, grants, revokes }` to a set of `(resourceType, resourcePointer)`
//! targets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use twin_kernel::{PolicyId, Revision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
}

/// A target of a policy entry: a resource type plus a JSON-pointer-shaped
/// path within that resource (e.g. `/features/temperature/properties`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceTarget {
    pub resource_type: String,
    pub resource_pointer: String,
}

impl ResourceTarget {
    pub fn new(resource_type: impl Into<String>, resource_pointer: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_pointer: resource_pointer.into(),
        }
    }

    /// Splits the pointer into its non-empty segments, e.g. `/a/b` -> `["a","b"]`.
    pub fn segments(&self) -> Vec<&str> {
        self.resource_pointer
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub subjects: BTreeSet<String>,
    pub grants: BTreeSet<Permission>,
    pub revokes: BTreeSet<Permission>,
    pub targets: Vec<ResourceTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: PolicyId,
    pub revision: Revision,
    pub entries: Vec<PolicyEntry>,
}

impl Policy {
    pub fn new(policy_id: PolicyId, revision: Revision) -> Self {
        Self {
            policy_id,
            revision,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: PolicyEntry) -> Self {
        self.entries.push(entry);
        self
    }
}
