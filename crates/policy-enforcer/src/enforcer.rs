//! The trie-based enforcer oracle.
//!
//! Policy entries are indexed by resource pointer; evaluation walks the
//! pointer, combining grants and revokes along the path with
//! "revoke overrides grant at same or deeper depth" semantics: nodes are
//! visited from the root outward, and whichever node along the path has the
//! deepest matching binding wins outright; a revoke at the same depth as a
//! grant always wins at that depth.

use crate::domain::{Permission, Policy, PolicyEntry, ResourceTarget};
use std::collections::{BTreeSet, HashMap};
use twin_kernel::{PolicyId, Revision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Grant,
    Revoke,
}

#[derive(Debug, Clone)]
struct Binding {
    subjects: BTreeSet<String>,
    permission: Permission,
    effect: Effect,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    bindings: Vec<Binding>,
}

/// Explains which binding (if any) determined the decision, for audit
/// logging alongside the authorize/deny outcome.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub decision: Decision,
    pub determining_depth: Option<usize>,
    pub reason: String,
}

/// Stateless, compiled form of a `Policy`: the oracle the enforcement flow
/// queries. Cheap to clone (all state lives behind the trie, built once).
#[derive(Debug, Clone)]
pub struct Enforcer {
    policy_id: PolicyId,
    revision: Revision,
    tries: HashMap<String, TrieNode>,
}

impl Enforcer {
    pub fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Every subject granted `Read` anywhere in this policy. Used by
    /// callers that need the maximal projection visible to *any* authorized
    /// subject rather than one specific requester (e.g. the search-index
    /// projection, which has no single viewer at write time).
    pub fn all_read_grant_subjects(&self) -> BTreeSet<String> {
        let mut subjects = BTreeSet::new();
        for trie in self.tries.values() {
            collect_read_grant_subjects(trie, &mut subjects);
        }
        subjects
    }

    pub fn compile(policy: &Policy) -> Self {
        let mut tries: HashMap<String, TrieNode> = HashMap::new();
        for entry in &policy.entries {
            for target in &entry.targets {
                let trie = tries.entry(target.resource_type.clone()).or_default();
                insert_entry(trie, &target.segments(), entry);
            }
        }
        Self {
            policy_id: policy.policy_id.clone(),
            revision: policy.revision,
            tries,
        }
    }

    pub fn authorize(
        &self,
        subjects: &BTreeSet<String>,
        resource: &ResourceTarget,
        permission: Permission,
    ) -> Decision {
        self.explain(subjects, resource, permission).decision
    }

    pub fn explain(
        &self,
        subjects: &BTreeSet<String>,
        resource: &ResourceTarget,
        permission: Permission,
    ) -> Explanation {
        let Some(root) = self.tries.get(&resource.resource_type) else {
            return Explanation {
                decision: Decision::Deny,
                determining_depth: None,
                reason: format!("no policy entries for resource type {}", resource.resource_type),
            };
        };

        let mut decision = Decision::Deny;
        let mut determining_depth = None;
        let mut reason = "implicit deny: no matching binding".to_string();
        let segments = resource.segments();
        let mut node = root;

        for depth in 0..=segments.len() {
            if depth > 0 {
                match node.children.get(segments[depth - 1]) {
                    Some(child) => node = child,
                    None => break,
                }
            }

            let mut granted_here = false;
            let mut revoked_here = false;
            for binding in &node.bindings {
                if binding.permission != permission {
                    continue;
                }
                if !subjects_intersect(&binding.subjects, subjects) {
                    continue;
                }
                match binding.effect {
                    Effect::Grant => granted_here = true,
                    Effect::Revoke => revoked_here = true,
                }
            }

            if revoked_here {
                decision = Decision::Deny;
                determining_depth = Some(depth);
                reason = format!("revoked at depth {depth}");
            } else if granted_here {
                decision = Decision::Allow;
                determining_depth = Some(depth);
                reason = format!("granted at depth {depth}");
            }
        }

        Explanation {
            decision,
            determining_depth,
            reason,
        }
    }

    /// Produces the maximal allowed JSON sub-view for `resource_type` under
    /// `Read`. Arrays are treated atomically: either
    /// the whole array at that pointer is visible or it is not — per-index
    /// policy targets are out of scope for this model.
    pub fn project(
        &self,
        subjects: &BTreeSet<String>,
        resource_type: &str,
        json: &serde_json::Value,
    ) -> serde_json::Value {
        self.project_at(subjects, resource_type, "", json)
            .unwrap_or(serde_json::Value::Null)
    }

    fn project_at(
        &self,
        subjects: &BTreeSet<String>,
        resource_type: &str,
        pointer: &str,
        value: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        let target = ResourceTarget::new(resource_type, pointer);
        let authorized = self.authorize(subjects, &target, Permission::Read).is_allow();

        match value {
            serde_json::Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    let child_pointer = format!("{pointer}/{k}");
                    if let Some(child) = self.project_at(subjects, resource_type, &child_pointer, v) {
                        out.insert(k.clone(), child);
                    }
                }
                if out.is_empty() {
                    authorized.then(|| serde_json::Value::Object(out))
                } else {
                    Some(serde_json::Value::Object(out))
                }
            }
            other => authorized.then(|| other.clone()),
        }
    }
}

fn subjects_intersect(binding_subjects: &BTreeSet<String>, query_subjects: &BTreeSet<String>) -> bool {
    binding_subjects.iter().any(|s| query_subjects.contains(s))
}

fn collect_read_grant_subjects(node: &TrieNode, out: &mut BTreeSet<String>) {
    for binding in &node.bindings {
        if binding.permission == Permission::Read && binding.effect == Effect::Grant {
            out.extend(binding.subjects.iter().cloned());
        }
    }
    for child in node.children.values() {
        collect_read_grant_subjects(child, out);
    }
}

fn insert_entry(root: &mut TrieNode, segments: &[&str], entry: &PolicyEntry) {
    let mut node = root;
    for segment in segments {
        node = node.children.entry((*segment).to_string()).or_default();
    }
    for &permission in entry.grants.iter() {
        node.bindings.push(Binding {
            subjects: entry.subjects.clone(),
            permission,
            effect: Effect::Grant,
        });
    }
    for &permission in entry.revokes.iter() {
        node.bindings.push(Binding {
            subjects: entry.subjects.clone(),
            permission,
            effect: Effect::Revoke,
        });
    }
}
