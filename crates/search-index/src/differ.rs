//! The write-model differ: given the last persisted document and the next
//! enforcement-flow output for the same twin, emits a full replacement, a
//! conditional patch, or nothing at all when the two are already equal.

use crate::document::assemble_persisted_document;
use serde_json::{Map, Value};
use twin_kernel::domain::revision::Revision;
use twin_kernel::domain::write_model::WriteModel;

/// The full persisted document the writer last durably acknowledged, kept
/// by the caller (the twin update task) across enforcement rounds.
#[derive(Debug, Clone)]
pub struct PersistedState {
    pub document: Value,
    pub revision: Revision,
}

/// Diffs `next` against `previous`. Returns `None` when the two are
/// semantically equal (no write needed). `next`'s embedded document is the
/// *projected* twin view produced by the enforcement flow; the returned
/// `Put`/`Patch` embeds the full persisted-shape document or patch.
pub fn diff(
    previous: Option<&PersistedState>,
    next: &WriteModel<Value>,
    patch_size_threshold: usize,
) -> Option<WriteModel<Value>> {
    match next {
        WriteModel::Delete(metadata) => Some(WriteModel::Delete(metadata.clone())),
        WriteModel::Put(metadata, projected) | WriteModel::Patch(metadata, projected, _) => {
            let persisted = assemble_persisted_document(metadata, projected);
            match previous {
                None => Some(WriteModel::Put(metadata.clone(), persisted)),
                Some(prev) => {
                    let mut sets = Map::new();
                    let mut unsets = Vec::new();
                    collect_diff("", &prev.document, &persisted, &mut sets, &mut unsets);

                    if sets.is_empty() && unsets.is_empty() {
                        return None;
                    }

                    let patch_doc = build_patch_document(sets, unsets);
                    if estimate_size(&patch_doc) > patch_size_threshold {
                        Some(WriteModel::Put(metadata.clone(), persisted))
                    } else {
                        Some(WriteModel::Patch(metadata.clone(), patch_doc, prev.revision))
                    }
                }
            }
        }
    }
}

fn collect_diff(prefix: &str, prev: &Value, next: &Value, sets: &mut Map<String, Value>, unsets: &mut Vec<String>) {
    match (prev, next) {
        (Value::Object(p), Value::Object(n)) => {
            for (key, prev_child) in p {
                let path = join_path(prefix, key);
                match n.get(key) {
                    Some(next_child) => collect_diff(&path, prev_child, next_child, sets, unsets),
                    None => unsets.push(path),
                }
            }
            for (key, next_child) in n {
                if !p.contains_key(key) {
                    sets.insert(join_path(prefix, key), next_child.clone());
                }
            }
        }
        _ => {
            if !semantically_equal(prev, next) {
                sets.insert(prefix.to_string(), next.clone());
            }
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn semantically_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn build_patch_document(sets: Map<String, Value>, unsets: Vec<String>) -> Value {
    let mut doc = Map::new();
    if !sets.is_empty() {
        doc.insert("$set".to_string(), Value::Object(sets));
    }
    if !unsets.is_empty() {
        let unset_obj: Map<String, Value> = unsets.into_iter().map(|p| (p, Value::Bool(true))).collect();
        doc.insert("$unset".to_string(), Value::Object(unset_obj));
    }
    Value::Object(doc)
}

fn estimate_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twin_kernel::domain::ids::TwinId;
    use twin_kernel::domain::metadata::Metadata;

    fn metadata(revision: i64) -> Metadata {
        let twin_id: TwinId = "org:t1".parse().unwrap();
        Metadata::new(twin_id, Revision(revision))
    }

    #[test]
    fn no_previous_state_emits_full_put() {
        let next = WriteModel::Put(metadata(1), json!({"attributes": {"a": 1}}));
        let result = diff(None, &next, 10_000).unwrap();
        assert!(matches!(result, WriteModel::Put(_, _)));
    }

    #[test]
    fn identical_projection_drops() {
        let projected = json!({"attributes": {"a": 1}});
        let meta = metadata(1);
        let persisted = assemble_persisted_document(&meta, &projected);
        let prev = PersistedState { document: persisted, revision: Revision(1) };

        let next = WriteModel::Put(metadata(1), projected);
        assert!(diff(Some(&prev), &next, 10_000).is_none());
    }

    #[test]
    fn numeric_representation_difference_is_not_a_diff() {
        let prev_projected = json!({"attributes": {"a": 1.0}});
        let meta = metadata(1);
        let persisted = assemble_persisted_document(&meta, &prev_projected);
        let prev = PersistedState { document: persisted, revision: Revision(1) };

        let next = WriteModel::Put(metadata(1), json!({"attributes": {"a": 1}}));
        assert!(diff(Some(&prev), &next, 10_000).is_none());
    }

    #[test]
    fn changed_field_emits_patch_with_set_and_filter_revision() {
        let prev_projected = json!({"attributes": {"a": 1}});
        let meta = metadata(1);
        let persisted = assemble_persisted_document(&meta, &prev_projected);
        let prev = PersistedState { document: persisted, revision: Revision(1) };

        let next = WriteModel::Put(metadata(2), json!({"attributes": {"a": 2}}));
        match diff(Some(&prev), &next, 10_000).unwrap() {
            WriteModel::Patch(_, patch, filter_revision) => {
                assert_eq!(filter_revision, Revision(1));
                assert_eq!(patch["$set"]["t.attributes.a"], 2);
            }
            other => panic!("expected Patch, got {other:?}"),
        }
    }

    #[test]
    fn removed_field_emits_unset() {
        let prev_projected = json!({"attributes": {"a": 1, "b": 2}});
        let meta = metadata(1);
        let persisted = assemble_persisted_document(&meta, &prev_projected);
        let prev = PersistedState { document: persisted, revision: Revision(1) };

        let next = WriteModel::Put(metadata(2), json!({"attributes": {"a": 1}}));
        match diff(Some(&prev), &next, 10_000).unwrap() {
            WriteModel::Patch(_, patch, _) => {
                assert_eq!(patch["$unset"]["t.attributes.b"], true);
            }
            other => panic!("expected Patch, got {other:?}"),
        }
    }

    #[test]
    fn patch_over_threshold_falls_back_to_put() {
        let prev_projected = json!({"attributes": {"a": 1}});
        let meta = metadata(1);
        let persisted = assemble_persisted_document(&meta, &prev_projected);
        let prev = PersistedState { document: persisted, revision: Revision(1) };

        let next = WriteModel::Put(metadata(2), json!({"attributes": {"a": 2}}));
        let result = diff(Some(&prev), &next, 0).unwrap();
        assert!(matches!(result, WriteModel::Put(_, _)));
    }

    #[test]
    fn next_delete_always_emits_delete_regardless_of_previous() {
        let meta = metadata(1);
        let persisted = assemble_persisted_document(&meta, &json!({}));
        let prev = PersistedState { document: persisted, revision: Revision(1) };

        let next = WriteModel::Delete(metadata(2));
        assert!(matches!(diff(Some(&prev), &next, 10_000).unwrap(), WriteModel::Delete(_)));
    }
}
