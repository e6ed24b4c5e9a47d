use kube::ResourceExt;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use serde_json::json;
use tracing::{debug, info};

use addon_crds::ManifestWork;

use crate::config_controller::Error;

/// Outcome of one pass over a deletion tier.
pub enum Progress {
    Done,
    Pending,
}

/// Make the dispatched work match the desired content.
///
/// Absent works are created; present works are updated only when the spec
/// actually differs, so a tick with unchanged desired state writes nothing.
/// Returns whether a write happened.
pub async fn ensure(api: &Api<ManifestWork>, desired: &ManifestWork) -> Result<bool, Error> {
    let name = desired.name_any();
    match api.get(&name).await {
        Ok(existing) => {
            if existing.spec == desired.spec {
                debug!(%name, "manifest work up to date");
                return Ok(false);
            }
            info!(%name, "manifest work changed, updating");
            let patch = json!({ "spec": desired.spec });
            api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
                .await
                .map_err(Error::Kube)?;
            Ok(true)
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            info!(%name, "creating manifest work");
            api.create(&PostParams::default(), desired)
                .await
                .map_err(Error::Kube)?;
            Ok(true)
        }
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Drive a dispatched work towards deletion.
///
/// Returns `true` only once the work is observed absent; an accepted delete
/// request does not count, since finalizers may still hold the object open.
/// With `force_cleanup` the finalizer list is cleared and persisted before
/// the delete is issued, for clusters whose agent will never phone home.
pub async fn delete(
    api: &Api<ManifestWork>,
    name: &str,
    force_cleanup: bool,
) -> Result<bool, Error> {
    let existing = match api.get(name).await {
        Ok(work) => work,
        Err(kube::Error::Api(err)) if err.code == 404 => return Ok(true),
        Err(e) => return Err(Error::Kube(e)),
    };

    if force_cleanup && !existing.finalizers().is_empty() {
        info!(%name, "force cleanup, releasing manifest work finalizers");
        let patch = json!({ "metadata": { "finalizers": null } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(Error::Kube)?;
    }

    if existing.metadata.deletion_timestamp.is_none() {
        info!(%name, "deleting manifest work");
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(Error::Kube)?;
    } else {
        debug!(%name, "manifest work still terminating");
    }
    Ok(false)
}
