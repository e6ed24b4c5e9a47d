use std::collections::BTreeMap;

use addon_crds::{AddonCapability, AddonValues, GlobalValues, KlusterletAddonConfig, ProxyPolicy};
use addon_images::ImageManifests;

/// Compute the controller-owned override document for one addon.
///
/// Image references are resolved from the loaded manifests for the config's
/// version, rewritten onto `spec.imageRegistry` when one is set.
pub fn values_for(
    config: &KlusterletAddonConfig,
    cap: &AddonCapability,
    images: &ImageManifests,
) -> Result<AddonValues, addon_images::Error> {
    let mut image_overrides = BTreeMap::new();
    for key in cap.image_keys {
        image_overrides.insert((*key).to_string(), resolved_image(config, images, key)?);
    }

    Ok(AddonValues {
        tolerations: Vec::new(),
        global: GlobalValues {
            image_overrides,
            node_selector: config.spec.node_selector.clone(),
            proxy_config: proxy_map(config, (cap.proxy_policy)(&config.spec)),
        },
    })
}

/// Proxy endpoints as the flat map carried in override documents and agent
/// CR payloads. Empty endpoints are omitted.
pub fn proxy_map(config: &KlusterletAddonConfig, policy: ProxyPolicy) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(proxy) = config.effective_proxy(policy) {
        if !proxy.http_proxy.is_empty() {
            map.insert("httpProxy".to_string(), proxy.http_proxy.clone());
        }
        if !proxy.https_proxy.is_empty() {
            map.insert("httpsProxy".to_string(), proxy.https_proxy.clone());
        }
        if !proxy.no_proxy.is_empty() {
            map.insert("noProxy".to_string(), proxy.no_proxy.clone());
        }
    }
    map
}

/// Resolve one component image honoring the registry override.
pub fn resolved_image(
    config: &KlusterletAddonConfig,
    images: &ImageManifests,
    key: &str,
) -> Result<String, addon_images::Error> {
    let entry = images.resolve_entry(key, &config.spec.version)?;
    Ok(if config.spec.image_registry.is_empty() {
        entry.reference()
    } else {
        entry.reference_in(&config.spec.image_registry)
    })
}
