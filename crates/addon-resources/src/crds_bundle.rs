use serde_json::{Value, json};

use addon_crds::{AddonCapability, AddonRegistry, KlusterletAddonConfig, ManifestWork};

use crate::common;

const AGENT_GROUP: &str = "agent.open-cluster-management.io";

/// The CRD bundle: one CustomResourceDefinition per known addon kind,
/// dispatched before anything that instantiates them.
pub fn build(config: &KlusterletAddonConfig, registry: &AddonRegistry) -> ManifestWork {
    let cluster = common::cluster_name(config);
    let manifests = registry.addons().map(crd_payload).collect();
    common::manifest_work(config, common::crds_work_name(&cluster), manifests)
}

fn crd_payload(cap: &AddonCapability) -> Value {
    json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": {
            "name": format!("{}.{AGENT_GROUP}", cap.crd_plural),
        },
        "spec": {
            "group": AGENT_GROUP,
            "names": {
                "kind": cap.crd_kind,
                "listKind": format!("{}List", cap.crd_kind),
                "plural": cap.crd_plural,
            },
            "scope": "Namespaced",
            "versions": [{
                "name": "v1",
                "served": true,
                "storage": true,
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "x-kubernetes-preserve-unknown-fields": true,
                    }
                }
            }]
        }
    })
}
