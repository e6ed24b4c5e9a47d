use serde_json::{Value, json};

use addon_crds::{KlusterletAddonConfig, ManifestWork};
use addon_images::ImageManifests;

use crate::common::{
    self, AGENT_NAMESPACE, OPERATOR_IMAGE_KEY, OPERATOR_NAME, operator_work_name,
};
use crate::overrides::resolved_image;

/// The addon-operator bundle: namespace, service account, RBAC, and the
/// operator deployment that reconciles the per-addon CRs on the spoke.
pub fn build(
    config: &KlusterletAddonConfig,
    images: &ImageManifests,
) -> Result<ManifestWork, addon_images::Error> {
    let cluster = common::cluster_name(config);
    let image = resolved_image(config, images, OPERATOR_IMAGE_KEY)?;

    let manifests = vec![
        namespace_payload(),
        service_account_payload(config),
        cluster_role_binding_payload(),
        deployment_payload(config, &image),
    ];
    Ok(common::manifest_work(
        config,
        operator_work_name(&cluster),
        manifests,
    ))
}

fn namespace_payload() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": AGENT_NAMESPACE },
    })
}

fn service_account_payload(config: &KlusterletAddonConfig) -> Value {
    let mut payload = json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": {
            "name": OPERATOR_NAME,
            "namespace": AGENT_NAMESPACE,
        },
    });
    if !config.spec.image_pull_secret.is_empty() {
        payload["imagePullSecrets"] = json!([{ "name": config.spec.image_pull_secret }]);
    }
    payload
}

fn cluster_role_binding_payload() -> Value {
    json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "ClusterRoleBinding",
        "metadata": { "name": OPERATOR_NAME },
        "roleRef": {
            "apiGroup": "rbac.authorization.k8s.io",
            "kind": "ClusterRole",
            "name": "cluster-admin",
        },
        "subjects": [{
            "kind": "ServiceAccount",
            "name": OPERATOR_NAME,
            "namespace": AGENT_NAMESPACE,
        }],
    })
}

fn deployment_payload(config: &KlusterletAddonConfig, image: &str) -> Value {
    let mut pod_spec = json!({
        "serviceAccountName": OPERATOR_NAME,
        "containers": [{
            "name": OPERATOR_NAME,
            "image": image,
            "imagePullPolicy": config.spec.image_pull_policy,
            "env": [
                { "name": "WATCH_NAMESPACE", "value": AGENT_NAMESPACE },
                { "name": "OPERATOR_NAME", "value": OPERATOR_NAME },
            ],
        }],
    });
    if !config.spec.node_selector.is_empty() {
        pod_spec["nodeSelector"] = json!(config.spec.node_selector);
    }

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": OPERATOR_NAME,
            "namespace": AGENT_NAMESPACE,
            "labels": { "app": OPERATOR_NAME },
        },
        "spec": {
            "replicas": 1,
            "selector": { "matchLabels": { "app": OPERATOR_NAME } },
            "template": {
                "metadata": { "labels": { "app": OPERATOR_NAME } },
                "spec": pod_spec,
            }
        }
    })
}
