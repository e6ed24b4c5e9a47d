use serde_json::{Value, json};

use addon_crds::{AddonCapability, KlusterletAddonConfig, ManifestWork};
use addon_images::ImageManifests;

use crate::common::{self, AGENT_NAMESPACE, addon_work_name};
use crate::overrides;

/// The per-addon bundle: one custom resource instructing the remote addon
/// operator to run that agent, carrying the resolved images and placement.
pub fn build(
    config: &KlusterletAddonConfig,
    cap: &AddonCapability,
    images: &ImageManifests,
) -> Result<ManifestWork, addon_images::Error> {
    let cluster = common::cluster_name(config);
    let values = overrides::values_for(config, cap, images)?;

    let mut spec = json!({
        "clusterName": cluster,
        "clusterNamespace": common::cluster_namespace(config),
        "clusterLabels": config.spec.cluster_labels,
        "version": config.spec.version,
        "global": {
            "imageOverrides": values.global.image_overrides,
            "imagePullPolicy": config.spec.image_pull_policy,
            "imagePullSecret": config.spec.image_pull_secret,
            "nodeSelector": values.global.node_selector,
            "proxyConfig": values.global.proxy_config,
        },
    });
    if cap.requires_hub_kubeconfig {
        spec["hubKubeconfigSecret"] = json!(format!("{}-hub-kubeconfig", cap.name));
    }

    let payload: Value = json!({
        "apiVersion": "agent.open-cluster-management.io/v1",
        "kind": cap.crd_kind,
        "metadata": {
            "name": cap.name,
            "namespace": AGENT_NAMESPACE,
        },
        "spec": spec,
    });

    Ok(common::manifest_work(
        config,
        addon_work_name(&cluster, cap.name),
        vec![payload],
    ))
}
