use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

use addon_crds::{KlusterletAddonConfig, ManifestWork, ManifestWorkSpec, ManifestsTemplate};

pub const MANAGER: &str = "addon-lifecycle-operator";

/// Namespace on the managed cluster where addon agents are installed.
pub const AGENT_NAMESPACE: &str = "open-cluster-management-agent-addon";

/// Remote identity of the addon operator workload.
pub const OPERATOR_NAME: &str = "klusterlet-addon-operator";

/// Image-manifest key of the addon operator itself.
pub const OPERATOR_IMAGE_KEY: &str = "klusterlet_addon_operator";

pub fn cluster_name(config: &KlusterletAddonConfig) -> String {
    if !config.spec.cluster_name.is_empty() {
        config.spec.cluster_name.clone()
    } else {
        config.metadata.name.clone().unwrap_or_default()
    }
}

pub fn cluster_namespace(config: &KlusterletAddonConfig) -> String {
    if !config.spec.cluster_namespace.is_empty() {
        config.spec.cluster_namespace.clone()
    } else {
        config.metadata.namespace.clone().unwrap_or_default()
    }
}

pub fn crds_work_name(cluster: &str) -> String {
    format!("{cluster}-klusterlet-addon-crds")
}

pub fn operator_work_name(cluster: &str) -> String {
    format!("{cluster}-klusterlet-addon-operator")
}

pub fn addon_work_name(cluster: &str, addon: &str) -> String {
    format!("{cluster}-klusterlet-addon-{addon}")
}

pub fn labels(config: &KlusterletAddonConfig) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".into(), OPERATOR_NAME.to_string()),
        ("app.kubernetes.io/instance".into(), cluster_name(config)),
        ("app.kubernetes.io/managed-by".into(), MANAGER.into()),
    ])
}

pub fn owner_reference(config: &KlusterletAddonConfig) -> OwnerReference {
    config.controller_owner_ref(&()).unwrap()
}

/// Assemble a ManifestWork in the cluster namespace, owned by the config
/// object, carrying the given ordered payloads.
pub fn manifest_work(
    config: &KlusterletAddonConfig,
    name: String,
    manifests: Vec<serde_json::Value>,
) -> ManifestWork {
    let mut work = ManifestWork::new(
        &name,
        ManifestWorkSpec {
            workload: ManifestsTemplate { manifests },
        },
    );
    work.metadata = ObjectMeta {
        name: Some(name),
        namespace: Some(cluster_namespace(config)),
        labels: Some(labels(config)),
        owner_references: Some(vec![owner_reference(config)]),
        ..Default::default()
    };
    work
}
