use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Toleration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The override document carried in the values annotation of a
/// ManagedClusterAddOn.
///
/// Only the fields below are managed by this controller; anything else an
/// administrator places in the annotation is opaque and survives merging
/// untouched (see [`merge_values`]).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonValues {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "GlobalValues::is_empty")]
    pub global: GlobalValues,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalValues {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub image_overrides: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub proxy_config: BTreeMap<String, String>,
}

impl GlobalValues {
    pub fn is_empty(&self) -> bool {
        self.image_overrides.is_empty()
            && self.node_selector.is_empty()
            && self.proxy_config.is_empty()
    }
}

impl AddonValues {
    pub fn is_empty(&self) -> bool {
        self.tolerations.is_empty() && self.global.is_empty()
    }

    /// Serialized annotation content, or `None` when there is nothing to
    /// override. "Nothing to override" and "annotation never set" are
    /// indistinguishable by contract.
    pub fn to_annotation(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        serde_json::to_string(self).ok()
    }

    /// The document form used for merging with an existing annotation.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Right-biased recursive union of two JSON documents.
///
/// Keys present in both sides where both values are objects are merged
/// recursively; on any other conflict the overlay value wins outright. Keys
/// present only in the base survive. There is no way to delete a base key
/// through the overlay.
pub fn merge_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut out = base_map.clone();
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.get(key) {
                    Some(base_val @ Value::Object(_)) if overlay_val.is_object() => {
                        merge_values(base_val, overlay_val)
                    }
                    _ => overlay_val.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        _ => overlay.clone(),
    }
}
