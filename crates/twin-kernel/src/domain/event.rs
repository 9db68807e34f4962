//! Twin events. Events for a given twin form a total order by
//! revision; revisions are strictly monotonic 64-bit integers starting at 1.

use crate::domain::ids::{PolicyId, TwinId};
use crate::domain::revision::Revision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    AttributeModified { pointer: String, value: serde_json::Value },
    FeatureCreated { feature_id: String },
    FeaturePropertiesCreated { feature_id: String, properties: serde_json::Value },
    FeaturePropertyModified { feature_id: String, pointer: String, value: serde_json::Value },
    FeatureDefinitionCreated { feature_id: String, definition: Vec<String> },
    PolicyIdChanged { policy_id: PolicyId },
}

impl EventKind {
    pub fn is_deleted(&self) -> bool {
        matches!(self, EventKind::Deleted)
    }
}

/// A single change to a twin, ordered by `revision` within that twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub twin_id: TwinId,
    pub revision: Revision,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Any event with `revision <= current` is stale and must be dropped.
    pub fn is_stale_against(&self, current: Revision) -> bool {
        self.revision <= current
    }

    /// Applies in sequence only if it is the immediate successor of `current`.
    pub fn is_immediate_successor_of(&self, current: Revision) -> bool {
        self.revision == current.next()
    }
}

/// Pick the latest event by timestamp, ties broken by revision.
pub fn latest_event(events: &[Event]) -> Option<&Event> {
    events.iter().max_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.revision.cmp(&b.revision))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(revision: i64, ts_secs: i64, kind: EventKind) -> Event {
        Event {
            twin_id: "org:t".parse().unwrap(),
            revision: Revision(revision),
            timestamp: DateTime::from_timestamp(ts_secs, 0).unwrap(),
            kind,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn stale_event_is_dropped() {
        let e = event(1234, 0, EventKind::Modified);
        assert!(e.is_stale_against(Revision(1234)));
        assert!(e.is_stale_against(Revision(1235)));
    }

    #[test]
    fn immediate_successor_is_applied() {
        let e = event(1235, 0, EventKind::Modified);
        assert!(e.is_immediate_successor_of(Revision(1234)));
        assert!(!e.is_immediate_successor_of(Revision(1233)));
    }

    #[test]
    fn latest_event_breaks_timestamp_ties_by_revision() {
        let a = event(10, 100, EventKind::Modified);
        let b = event(11, 100, EventKind::Deleted);
        let picked = latest_event(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(picked.revision, b.revision);
    }

    #[test]
    fn latest_event_prefers_newer_timestamp() {
        let a = event(10, 100, EventKind::Modified);
        let b = event(9, 200, EventKind::Deleted);
        let picked = latest_event(&[a, b.clone()]).unwrap();
        assert_eq!(picked.revision, b.revision);
    }
}
