//! Logical twin and feature representation.

use crate::domain::ids::{PolicyId, TwinId};
use crate::domain::revision::Revision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named aspect of a twin with its own definition and properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub definition: Vec<String>,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub desired_properties: serde_json::Value,
}

impl Default for Feature {
    fn default() -> Self {
        Self {
            definition: Vec::new(),
            properties: serde_json::Value::Object(Default::default()),
            desired_properties: serde_json::Value::Object(Default::default()),
        }
    }
}

pub type FeatureId = String;

/// The authoritative JSON representation of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Twin {
    pub twin_id: TwinId,
    pub policy_id: Option<PolicyId>,
    pub revision: Revision,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub features: BTreeMap<FeatureId, Feature>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Twin {
    /// Projects the twin into a plain JSON value the way the wire
    /// representation (and the enrichment facade's cache) stores it.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "thingId": self.twin_id.to_string(),
            "policyId": self.policy_id.as_ref().map(|p| p.to_string()),
            "_revision": self.revision.0,
            "attributes": self.attributes,
            "features": self.features,
            "_modified": self.modified.to_rfc3339(),
            "_metadata": self.metadata,
        })
    }
}
