use kube::ResourceExt;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use serde_json::{Value, json};
use tracing::{debug, info};

use addon_crds::{
    AddonCapability, AddonValues, KlusterletAddonConfig, ManagedClusterAddOn,
    ManagedClusterAddOnSpec, VALUES_ANNOTATION, merge_values,
};
use addon_resources::common;

use crate::config_controller::Error;

/// Reconcile the registration record of one addon.
///
/// The values annotation is merged, never overwritten: fields another actor
/// placed there survive, and an unchanged merge result writes nothing.
/// Returns whether a write happened.
pub async fn sync(
    api: &Api<ManagedClusterAddOn>,
    config: &KlusterletAddonConfig,
    cap: &AddonCapability,
    enabled: bool,
    overrides: &AddonValues,
) -> Result<bool, Error> {
    let existing = match api.get(cap.name).await {
        Ok(addon) => Some(addon),
        Err(kube::Error::Api(err)) if err.code == 404 => None,
        Err(e) => return Err(Error::Kube(e)),
    };

    if !enabled {
        if existing.is_none() {
            return Ok(false);
        }
        return match api.delete(cap.name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(addon = cap.name, "deleted addon registration");
                Ok(true)
            }
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(false),
            Err(e) => Err(Error::Kube(e)),
        };
    }

    let Some(existing) = existing else {
        let mut addon = ManagedClusterAddOn::new(
            cap.name,
            ManagedClusterAddOnSpec {
                install_namespace: common::AGENT_NAMESPACE.to_string(),
            },
        );
        addon.metadata.namespace = Some(common::cluster_namespace(config));
        addon.metadata.owner_references = Some(vec![common::owner_reference(config)]);
        if let Some(doc) = overrides.to_annotation() {
            addon
                .metadata
                .annotations
                .get_or_insert_with(Default::default)
                .insert(VALUES_ANNOTATION.to_string(), doc);
        }
        info!(addon = cap.name, "creating addon registration");
        api.create(&PostParams::default(), &addon)
            .await
            .map_err(Error::Kube)?;
        return Ok(true);
    };

    let existing_doc: Value = match existing.annotations().get(VALUES_ANNOTATION) {
        Some(raw) => serde_json::from_str(raw).map_err(Error::Serialization)?,
        None => json!({}),
    };
    let merged = merge_values(&existing_doc, &overrides.to_document());
    if merged == existing_doc {
        debug!(addon = cap.name, "addon registration up to date");
        return Ok(false);
    }

    let raw = serde_json::to_string(&merged).map_err(Error::Serialization)?;
    let patch = json!({ "metadata": { "annotations": { (VALUES_ANNOTATION): raw } } });
    info!(addon = cap.name, "updating addon registration overrides");
    api.patch(cap.name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .map_err(Error::Kube)?;
    Ok(true)
}
