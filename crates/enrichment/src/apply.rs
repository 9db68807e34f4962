//! Incremental event application over a cached twin snapshot.
//!
//! Not every event kind carries enough information to apply as a delta:
//! `Created`/`Modified` are coarse markers the upstream source emits without
//! a structural payload, and `Deleted` is handled by the caller before
//! reaching here. Applying one of those returns `NotIncrementallyApplicable`,
//! which signals the facade to fall back to a full fetch.

use serde_json::Value;
use twin_kernel::domain::event::{Event, EventKind};
use twin_kernel::domain::twin::{Feature, Twin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotIncrementallyApplicable;

pub fn apply_event(twin: &mut Twin, event: &Event) -> Result<(), NotIncrementallyApplicable> {
    match &event.kind {
        EventKind::Created | EventKind::Modified | EventKind::Deleted => {
            return Err(NotIncrementallyApplicable);
        }
        EventKind::AttributeModified { pointer, value } => {
            set_at_pointer(&mut twin.attributes, pointer, value.clone())?;
        }
        EventKind::PolicyIdChanged { policy_id } => {
            twin.policy_id = Some(policy_id.clone());
        }
        EventKind::FeatureCreated { feature_id } => {
            twin.features.entry(feature_id.clone()).or_insert_with(Feature::default);
        }
        EventKind::FeaturePropertiesCreated { feature_id, properties } => {
            let feature = twin.features.entry(feature_id.clone()).or_insert_with(Feature::default);
            feature.properties = properties.clone();
        }
        EventKind::FeaturePropertyModified { feature_id, pointer, value } => {
            let feature = twin
                .features
                .get_mut(feature_id)
                .ok_or(NotIncrementallyApplicable)?;
            set_at_pointer(&mut feature.properties, pointer, value.clone())?;
        }
        EventKind::FeatureDefinitionCreated { feature_id, definition } => {
            let feature = twin.features.entry(feature_id.clone()).or_insert_with(Feature::default);
            feature.definition = definition.clone();
        }
    }
    twin.revision = event.revision;
    twin.modified = event.timestamp;
    Ok(())
}

/// Sets `value` at a JSON-pointer-shaped path within `root`, creating
/// intermediate objects as needed. Refuses to descend through a non-object,
/// non-missing node (the shape the upstream source would never actually
/// produce for this event kind).
fn set_at_pointer(root: &mut Value, pointer: &str, value: Value) -> Result<(), NotIncrementallyApplicable> {
    let segments: Vec<&str> = pointer.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        *root = value;
        return Ok(());
    }
    if !root.is_object() {
        *root = Value::Object(Default::default());
    }
    let mut cursor = root;
    for (i, seg) in segments.iter().enumerate() {
        let obj = cursor.as_object_mut().ok_or(NotIncrementallyApplicable)?;
        if i == segments.len() - 1 {
            obj.insert((*seg).to_string(), value);
            return Ok(());
        }
        cursor = obj
            .entry((*seg).to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use twin_kernel::domain::revision::Revision;

    fn base_twin() -> Twin {
        Twin {
            twin_id: "org:temp-1".parse().unwrap(),
            policy_id: None,
            revision: Revision(1),
            attributes: serde_json::json!({"a": 1}),
            features: BTreeMap::new(),
            modified: Utc::now(),
            metadata: Value::Null,
        }
    }

    fn event(revision: i64, kind: EventKind) -> Event {
        Event {
            twin_id: "org:temp-1".parse().unwrap(),
            revision: Revision(revision),
            timestamp: Utc::now(),
            kind,
            payload: Value::Null,
        }
    }

    #[test]
    fn attribute_modified_sets_nested_pointer() {
        let mut twin = base_twin();
        let e = event(
            2,
            EventKind::AttributeModified {
                pointer: "/nested/x".to_string(),
                value: serde_json::json!(42),
            },
        );
        apply_event(&mut twin, &e).unwrap();
        assert_eq!(twin.attributes["nested"]["x"], 42);
        assert_eq!(twin.revision, Revision(2));
    }

    #[test]
    fn feature_property_modified_requires_existing_feature() {
        let mut twin = base_twin();
        let e = event(
            2,
            EventKind::FeaturePropertyModified {
                feature_id: "temp".to_string(),
                pointer: "/x".to_string(),
                value: serde_json::json!(1),
            },
        );
        assert!(apply_event(&mut twin, &e).is_err());
    }

    #[test]
    fn feature_created_then_property_modified_applies_in_sequence() {
        let mut twin = base_twin();
        apply_event(&mut twin, &event(2, EventKind::FeatureCreated { feature_id: "temp".to_string() })).unwrap();
        apply_event(
            &mut twin,
            &event(
                3,
                EventKind::FeaturePropertyModified {
                    feature_id: "temp".to_string(),
                    pointer: "/value".to_string(),
                    value: serde_json::json!(21.5),
                },
            ),
        )
        .unwrap();
        assert_eq!(twin.features["temp"].properties["value"], 21.5);
    }

    #[test]
    fn created_and_modified_markers_are_not_incrementally_applicable() {
        let mut twin = base_twin();
        assert!(apply_event(&mut twin, &event(2, EventKind::Created)).is_err());
        assert!(apply_event(&mut twin, &event(2, EventKind::Modified)).is_err());
    }
}
