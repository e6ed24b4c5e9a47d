use std::collections::BTreeMap;

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::KlusterletAddonConfigStatus;
use super::types::{AddonAgentConfig, ProxyConfig, ProxyPolicy};

/// Annotation that suspends all reconciliation of a configuration object
/// while its value is `"true"` (case-insensitive).
pub const PAUSE_ANNOTATION: &str = "klusterletaddonconfig-pause";

/// Finalizer owned by this controller. Present on the configuration object
/// and its ManagedCluster whenever dispatched work may still exist remotely.
pub const ADDON_FINALIZER: &str =
    "agent.open-cluster-management.io/klusterletaddonconfig-cleanup";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "agent.open-cluster-management.io",
    version = "v1",
    kind = "KlusterletAddonConfig",
    namespaced,
    status = "KlusterletAddonConfigStatus",
    shortname = "kac",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Complete","type":"string","jsonPath":".status.conditions[?(@.conditionType==\"Complete\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletAddonConfigSpec {
    /// Name of the managed cluster. Mirrors the object name; the object name
    /// is authoritative when they disagree.
    #[serde(default)]
    pub cluster_name: String,

    /// Namespace the dispatched work targets. Mirrors the object namespace.
    #[serde(default)]
    pub cluster_namespace: String,

    #[serde(default)]
    pub cluster_labels: BTreeMap<String, String>,

    /// Desired product version; resolved to concrete agent images through the
    /// loaded image manifests.
    pub version: String,

    /// Custom proxy endpoints, consumed by addons with the `CustomProxy`
    /// policy.
    #[serde(default)]
    pub proxy_config: Option<ProxyConfig>,

    #[serde(default)]
    pub application_manager: AddonAgentConfig,
    #[serde(default)]
    pub cert_policy_controller: AddonAgentConfig,
    #[serde(default)]
    pub iam_policy_controller: AddonAgentConfig,
    #[serde(default)]
    pub policy_controller: AddonAgentConfig,
    #[serde(default)]
    pub search_collector: AddonAgentConfig,

    /// Registry that replaces the manifest-provided one in every resolved
    /// image reference when set.
    #[serde(default)]
    pub image_registry: String,
    #[serde(default)]
    pub image_pull_secret: String,
    #[serde(default = "default_pull_policy")]
    pub image_pull_policy: String,

    /// Node placement applied to every dispatched agent workload.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

fn default_pull_policy() -> String {
    "IfNotPresent".to_string()
}

impl KlusterletAddonConfig {
    /// Whether the pause annotation suspends reconciliation of this object.
    pub fn paused(&self) -> bool {
        self.annotations()
            .get(PAUSE_ANNOTATION)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// The proxy endpoints an addon with the given policy should receive.
    pub fn effective_proxy(&self, policy: ProxyPolicy) -> Option<&ProxyConfig> {
        match policy {
            ProxyPolicy::Disabled => None,
            ProxyPolicy::CustomProxy => self.spec.proxy_config.as_ref(),
            ProxyPolicy::OCPGlobalProxy => self
                .status
                .as_ref()
                .and_then(|s| s.ocp_global_proxy.as_ref())
                .filter(|p| !p.is_empty()),
        }
    }
}
