//! Hub-platform API types this controller talks to but does not own.
//!
//! Only the schema subset the controller reads or writes is modelled; the
//! CRDs themselves are installed by the hub platform.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the managed-cluster name on certificate requests.
pub const CLUSTER_NAME_LABEL: &str = "open-cluster-management.io/cluster-name";
/// Label carrying the addon name on certificate requests.
pub const ADDON_NAME_LABEL: &str = "open-cluster-management.io/addon-name";
/// Annotation on a ManagedClusterAddOn holding the merged override document.
pub const VALUES_ANNOTATION: &str = "addon.open-cluster-management.io/values";
/// Signer expected on addon agent certificate requests.
pub const KUBE_API_CLIENT_SIGNER: &str = "kubernetes.io/kube-apiserver-client";

pub const CONDITION_HUB_ACCEPTED: &str = "HubAcceptedManagedCluster";
pub const CONDITION_AVAILABLE: &str = "ManagedClusterConditionAvailable";

/// Requestor identity prefix expected on agent CSRs for a cluster.
pub fn hub_agent_user_prefix(cluster: &str) -> String {
    format!("system:open-cluster-management:{cluster}:")
}

/// Subject organization an addon agent CSR must embed; the common name must
/// additionally be prefixed by this string.
pub fn addon_subject_organization(cluster: &str, addon: &str) -> String {
    format!("system:open-cluster-management:cluster:{cluster}:addon:{addon}")
}

/// Condition shape used by the hub APIs (`type`, not `conditionType`).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_transition_time: String,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1",
    kind = "ManagedCluster",
    status = "ManagedClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Whether the hub has accepted this cluster's registration.
    #[serde(default)]
    pub hub_accepts_client: bool,
    #[serde(default)]
    pub lease_duration_seconds: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    #[serde(default)]
    pub conditions: Vec<HubCondition>,
}

impl ManagedCluster {
    fn condition_true(&self, condition_type: &str) -> bool {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == condition_type && c.status == "True")
    }

    /// Registration accepted: the hub admin opted in and registration
    /// acknowledged it.
    pub fn accepted(&self) -> bool {
        self.spec.hub_accepts_client && self.condition_true(CONDITION_HUB_ACCEPTED)
    }

    /// The cluster's agent is currently reachable from the hub.
    pub fn available(&self) -> bool {
        self.condition_true(CONDITION_AVAILABLE)
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "work.open-cluster-management.io",
    version = "v1",
    kind = "ManifestWork",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    #[serde(default)]
    pub workload: ManifestsTemplate,
}

/// Ordered, opaque resource payloads applied as a unit on the spoke.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestsTemplate {
    #[serde(default)]
    pub manifests: Vec<serde_json::Value>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "addon.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ManagedClusterAddOn",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnSpec {
    #[serde(default)]
    pub install_namespace: String,
}
