//! Persisted document shape: `{ _id, _revision, _policyRevision, f, t }`.

use serde_json::{json, Value};
use twin_kernel::domain::metadata::Metadata;

/// Builds the full persisted-shape document for a twin from the projected
/// search view produced by the enforcement flow.
pub fn assemble_persisted_document(metadata: &Metadata, projected: &Value) -> Value {
    let feature_ids: Vec<Value> = projected
        .get("features")
        .and_then(Value::as_object)
        .map(|features| features.keys().cloned().map(Value::String).collect())
        .unwrap_or_default();

    json!({
        "_id": metadata.twin_id.to_string(),
        "_revision": metadata.thing_revision.0,
        "_policyRevision": metadata.policy_revision.map(|r| r.0),
        "f": feature_ids,
        "t": projected,
    })
}

pub fn to_bson_document(value: &Value) -> Result<mongodb::bson::Document, mongodb::bson::ser::Error> {
    mongodb::bson::to_document(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_kernel::domain::revision::Revision;

    #[test]
    fn assembles_id_revision_and_feature_ids() {
        let metadata = Metadata::new("org:t1".parse().unwrap(), Revision(3));
        let projected = json!({
            "attributes": {"a": 1},
            "features": {"temp": {"properties": {"x": 5}}, "humidity": {}}
        });
        let doc = assemble_persisted_document(&metadata, &projected);
        assert_eq!(doc["_id"], "org:t1");
        assert_eq!(doc["_revision"], 3);
        let mut f = doc["f"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect::<Vec<_>>();
        f.sort();
        assert_eq!(f, vec!["humidity", "temp"]);
        assert_eq!(doc["t"]["attributes"]["a"], 1);
    }
}
