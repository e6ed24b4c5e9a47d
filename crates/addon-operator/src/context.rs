use std::sync::Arc;

use addon_crds::AddonRegistry;
use addon_images::ImageManifests;
use kube::Client;
use kube::runtime::events::Reporter;
use tracing::{info, warn};

/// Directory of `*.json` image manifests, one per product version.
pub const IMAGE_MANIFEST_DIR_ENV: &str = "IMAGE_MANIFEST_DIR";

pub struct Context {
    pub client: Client,
    /// Known addons and their capabilities, fixed for the process lifetime.
    pub registry: AddonRegistry,
    /// Image manifests loaded at startup from IMAGE_MANIFEST_DIR.
    pub images: Arc<ImageManifests>,
    /// Reporter identity used when publishing Kubernetes Events.
    pub reporter: Reporter,
    /// Restrict watches to a single cluster namespace when set.
    pub watch_namespace: Option<String>,
}

impl Context {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: "addon-lifecycle-operator".into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            client,
            registry: AddonRegistry::new(),
            images: Arc::new(load_image_manifests()),
            reporter,
            watch_namespace: std::env::var("WATCH_NAMESPACE").ok(),
        }
    }
}

/// Load the image manifest set, or start with an empty one; resolution then
/// fails per-reconcile and the standard backoff retries once manifests are
/// mounted.
pub fn load_image_manifests() -> ImageManifests {
    let dir = match std::env::var(IMAGE_MANIFEST_DIR_ENV) {
        Ok(dir) => dir,
        Err(_) => {
            warn!("{IMAGE_MANIFEST_DIR_ENV} not set, starting with no image manifests");
            return ImageManifests::new();
        }
    };
    match ImageManifests::from_dir(&dir) {
        Ok(manifests) => {
            info!(%dir, versions = manifests.versions().count(), "loaded image manifests");
            manifests
        }
        Err(e) => {
            warn!(%dir, error = %e, "failed to load image manifests");
            ImageManifests::new()
        }
    }
}
