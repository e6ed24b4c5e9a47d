use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::{Event, EventType, Recorder};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, CustomResourceExt, Resource, ResourceExt};
use serde_json::json;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use addon_crds::{
    ADDON_FINALIZER, AddonValues, Condition, KlusterletAddonConfig, ManagedCluster,
    ManagedClusterAddOn, ManifestWork, ProxyPolicy, condition_types,
};
use addon_resources::{addon_cr, common, crds_bundle, operator_bundle, overrides};

use crate::addons;
use crate::context::Context;
use crate::metrics::{
    increment_reconcile_total, increment_work_applies, observe_reconcile_duration,
    set_managed_configs,
};
use crate::work::{self, Progress};

const FIELD_MANAGER: &str = "addon-lifecycle-operator";

/// Polling interval while waiting on deletion tiers or cluster acceptance.
const SHORT_REQUEUE: Duration = Duration::from_secs(5);
/// Steady-state self-heal interval.
const LONG_REQUEUE: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("Image resolution error: {0}")]
    ImageResolve(#[source] addon_images::Error),
}

pub fn print_crd() -> Result<()> {
    let crd = KlusterletAddonConfig::crd();
    let yaml = serde_yaml::to_string(&crd)?;
    println!("{yaml}");
    Ok(())
}

pub async fn run(server_state: crate::server::ServerState) -> Result<()> {
    let client = Client::try_default().await?;
    let ctx = Arc::new(Context::new(client.clone()));

    let (configs, works, addon_api) = if let Some(ref ns) = ctx.watch_namespace {
        (
            Api::<KlusterletAddonConfig>::namespaced(client.clone(), ns),
            Api::<ManifestWork>::namespaced(client.clone(), ns),
            Api::<ManagedClusterAddOn>::namespaced(client.clone(), ns),
        )
    } else {
        (
            Api::<KlusterletAddonConfig>::all(client.clone()),
            Api::<ManifestWork>::all(client.clone()),
            Api::<ManagedClusterAddOn>::all(client.clone()),
        )
    };
    let clusters = Api::<ManagedCluster>::all(client.clone());

    info!("Starting addon config controller");
    server_state.set_ready();

    Controller::new(configs, watcher::Config::default())
        .owns(works, watcher::Config::default())
        .owns(addon_api, watcher::Config::default())
        .watches(clusters, watcher::Config::default(), |cluster| {
            // A cluster maps to the like-named config in the like-named
            // namespace.
            let name = cluster.name_any();
            Some(ObjectRef::new(&name).within(&name))
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!(?o, "reconciled"),
                Err(e) => error!(%e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

pub async fn reconcile(
    config: Arc<KlusterletAddonConfig>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let cluster_name = config.name_any();
    let start_time = std::time::Instant::now();

    let outcome = match reconcile_cluster(&ctx, &cluster_name).await {
        // Lost optimistic-concurrency races are expected under concurrent
        // writers and simply retried.
        Err(Error::Kube(e)) if is_conflict(&e) => {
            debug!(cluster = %cluster_name, "write conflict, retrying shortly");
            Ok(Action::requeue(SHORT_REQUEUE))
        }
        other => other,
    };

    observe_reconcile_duration(start_time.elapsed().as_secs_f64());

    if outcome.is_ok() {
        increment_reconcile_total("success");
        update_managed_gauge(&ctx).await;
    }
    outcome
}

pub fn error_policy(
    _config: Arc<KlusterletAddonConfig>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    increment_reconcile_total("error");
    warn!(%error, "reconciliation failed, requeuing");
    Action::requeue(Duration::from_secs(60))
}

/// The full state machine over the (cluster record, config object) pair.
///
/// All state is fetched fresh: the branch taken is recomputed from what the
/// API currently holds, never from a remembered phase, so any partial
/// progress followed by a crash resumes correctly.
pub async fn reconcile_cluster(ctx: &Context, cluster_name: &str) -> Result<Action, Error> {
    let client = &ctx.client;
    let clusters = Api::<ManagedCluster>::all(client.clone());
    let configs = Api::<KlusterletAddonConfig>::namespaced(client.clone(), cluster_name);
    let works = Api::<ManifestWork>::namespaced(client.clone(), cluster_name);
    let addon_api = Api::<ManagedClusterAddOn>::namespaced(client.clone(), cluster_name);

    let cluster = clusters.get_opt(cluster_name).await.map_err(Error::Kube)?;
    let config = configs.get_opt(cluster_name).await.map_err(Error::Kube)?;

    match (cluster, config) {
        (None, None) => Ok(Action::await_change()),
        (None, Some(config)) => {
            // Cluster gone: whatever was dispatched went with it, abandon.
            if has_finalizer(&config) {
                info!(cluster = %cluster_name, "cluster record gone, releasing config");
                remove_finalizer(&configs, &config).await.map_err(Error::Kube)?;
            }
            Ok(Action::await_change())
        }
        (Some(cluster), None) => {
            if has_finalizer(&cluster) {
                info!(cluster = %cluster_name, "config gone, releasing cluster record");
                remove_finalizer(&clusters, &cluster).await.map_err(Error::Kube)?;
            }
            Ok(Action::await_change())
        }
        (Some(cluster), Some(config)) => {
            if cluster.metadata.deletion_timestamp.is_some()
                || config.metadata.deletion_timestamp.is_some()
            {
                teardown(ctx, &clusters, &configs, &works, &addon_api, &cluster, &config).await
            } else {
                reconcile_active(ctx, &clusters, &configs, &works, &addon_api, &cluster, &config)
                    .await
            }
        }
    }
}

/// Tiered teardown of everything dispatched for a cluster.
///
/// Each tier must be observed absent before the next is touched: CRs need
/// the operator and CRDs to terminate cleanly, so the order is CRs, then the
/// operator, then the CRDs. Progress within a tier is re-derived from live
/// state on every call.
#[allow(clippy::too_many_arguments)]
async fn teardown(
    ctx: &Context,
    clusters: &Api<ManagedCluster>,
    configs: &Api<KlusterletAddonConfig>,
    works: &Api<ManifestWork>,
    addon_api: &Api<ManagedClusterAddOn>,
    cluster: &ManagedCluster,
    config: &KlusterletAddonConfig,
) -> Result<Action, Error> {
    let cluster_name = cluster.name_any();
    // An unreachable agent never runs its cleanup hooks; release the works
    // instead of stalling forever.
    let force_cleanup = !cluster.available();
    info!(cluster = %cluster_name, force_cleanup, "tearing down dispatched addons");

    // Tier 1: addon CRs, and the registration records alongside them.
    let mut tier = Progress::Done;
    for cap in ctx.registry.addons() {
        let name = common::addon_work_name(&cluster_name, cap.name);
        if !work::delete(works, &name, force_cleanup).await? {
            tier = Progress::Pending;
        }
        match addon_api.delete(cap.name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(err)) if err.code == 404 => {}
            Err(e) => return Err(Error::Kube(e)),
        }
    }
    if matches!(tier, Progress::Pending) {
        debug!(cluster = %cluster_name, "addon works still present");
        return Ok(Action::requeue(SHORT_REQUEUE));
    }

    // Tier 2: the operator reconciling those CRs.
    if !work::delete(works, &common::operator_work_name(&cluster_name), force_cleanup).await? {
        return Ok(Action::requeue(SHORT_REQUEUE));
    }

    // Tier 3: the CRDs everything above depended on.
    if !work::delete(works, &common::crds_work_name(&cluster_name), force_cleanup).await? {
        return Ok(Action::requeue(SHORT_REQUEUE));
    }

    // Cluster record first: a crash here leaves the config finalizer in
    // place, which keeps this branch reachable on the next reconcile.
    if has_finalizer(cluster) {
        remove_finalizer(clusters, cluster).await.map_err(Error::Kube)?;
    }
    if has_finalizer(config) {
        remove_finalizer(configs, config).await.map_err(Error::Kube)?;
    }

    info!(cluster = %cluster_name, "teardown complete");
    Ok(Action::await_change())
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_active(
    ctx: &Context,
    clusters: &Api<ManagedCluster>,
    configs: &Api<KlusterletAddonConfig>,
    works: &Api<ManifestWork>,
    addon_api: &Api<ManagedClusterAddOn>,
    cluster: &ManagedCluster,
    config: &KlusterletAddonConfig,
) -> Result<Action, Error> {
    let cluster_name = cluster.name_any();

    if config.paused() {
        info!(cluster = %cluster_name, "reconciliation paused by annotation");
        return Ok(Action::await_change());
    }

    if !cluster.accepted() {
        if has_finalizer(cluster) {
            // The finalizer is only ever added on an accepted cluster, so
            // this is the accepted-to-revoked transition: cascade into
            // config deletion.
            warn!(cluster = %cluster_name, "cluster no longer accepted, deleting config");
            match configs.delete(&cluster_name, &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(err)) if err.code == 404 => {}
                Err(e) => return Err(Error::Kube(e)),
            }
        } else {
            debug!(cluster = %cluster_name, "cluster not accepted yet, waiting");
        }
        return Ok(Action::requeue(SHORT_REQUEUE));
    }

    // Both finalizers precede the first dispatch.
    if !has_finalizer(cluster) {
        add_finalizer(clusters, cluster).await.map_err(Error::Kube)?;
    }
    if !has_finalizer(config) {
        add_finalizer(configs, config).await.map_err(Error::Kube)?;
    }

    let recorder = Recorder::new(ctx.client.clone(), ctx.reporter.clone());
    let obj_ref = config.object_ref(&());
    let mut writes = 0usize;

    // CRDs before the operator, the operator before any addon CR.
    let crds_work = crds_bundle::build(config, &ctx.registry);
    if work::ensure(works, &crds_work).await? {
        increment_work_applies("crds");
        writes += 1;
    }

    let operator_work =
        operator_bundle::build(config, &ctx.images).map_err(Error::ImageResolve)?;
    if work::ensure(works, &operator_work).await? {
        increment_work_applies("operator");
        writes += 1;
    }

    for cap in ctx.registry.addons() {
        if (cap.enabled)(&config.spec) {
            let cr_work =
                addon_cr::build(config, cap, &ctx.images).map_err(Error::ImageResolve)?;
            if work::ensure(works, &cr_work).await? {
                increment_work_applies("addon");
                writes += 1;
            }
            let values =
                overrides::values_for(config, cap, &ctx.images).map_err(Error::ImageResolve)?;
            if addons::sync(addon_api, config, cap, true, &values).await? {
                writes += 1;
            }
        } else {
            // Kick the removal off now; later ticks confirm it is gone.
            work::delete(works, &common::addon_work_name(&cluster_name, cap.name), false)
                .await?;
            if addons::sync(addon_api, config, cap, false, &AddonValues::default()).await? {
                writes += 1;
            }
        }
    }

    update_status(configs, config, ctx).await?;

    if writes > 0 {
        recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: "AddonsReconciled".into(),
                    note: Some(format!("{writes} addon resource(s) written")),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &obj_ref,
            )
            .await
            .map_err(Error::Kube)?;
    }

    info!(cluster = %cluster_name, writes, "reconciliation complete");
    Ok(Action::requeue(LONG_REQUEUE))
}

/// Maintain the config's conditions; only the conditions list is applied so
/// fields owned by other writers (like the detected platform proxy) are
/// never claimed.
async fn update_status(
    configs: &Api<KlusterletAddonConfig>,
    config: &KlusterletAddonConfig,
    ctx: &Context,
) -> Result<(), Error> {
    let now = chrono_now();
    let enabled = ctx
        .registry
        .addons()
        .filter(|cap| (cap.enabled)(&config.spec))
        .count();

    let mut desired = vec![
        Condition::fail(
            condition_types::PROGRESSING,
            "AddonsDispatched",
            "all addon resources dispatched",
            &now,
        ),
        Condition::ok(
            condition_types::COMPLETE,
            "ReconcileCompleted",
            &format!("{enabled} addon(s) enabled"),
            &now,
        ),
    ];

    let wants_platform_proxy = ctx.registry.addons().any(|cap| {
        (cap.enabled)(&config.spec)
            && (cap.proxy_policy)(&config.spec) == ProxyPolicy::OCPGlobalProxy
    });
    if wants_platform_proxy {
        let detected = config
            .status
            .as_ref()
            .and_then(|s| s.ocp_global_proxy.as_ref())
            .is_some_and(|p| !p.is_empty());
        desired.push(if detected {
            Condition::ok(
                condition_types::OCP_GLOBAL_PROXY_DETECTED,
                "ProxyDetected",
                "platform proxy settings available",
                &now,
            )
        } else {
            Condition::fail(
                condition_types::OCP_GLOBAL_PROXY_DETECTED,
                "ProxyNotDetected",
                "no platform proxy settings detected yet",
                &now,
            )
        });
    }

    let existing = config.status.clone().unwrap_or_default();
    let unchanged = desired.iter().all(|d| {
        existing
            .condition(&d.condition_type)
            .is_some_and(|c| c.same_as(d))
    });
    if unchanged {
        return Ok(());
    }

    let mut status = existing;
    for cond in desired {
        status.set_condition(cond);
    }

    let status_patch = json!({
        "apiVersion": "agent.open-cluster-management.io/v1",
        "kind": "KlusterletAddonConfig",
        "status": { "conditions": status.conditions },
    });
    configs
        .patch_status(
            &config.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(status_patch),
        )
        .await
        .map_err(Error::Kube)?;
    Ok(())
}

async fn update_managed_gauge(ctx: &Context) {
    let gauge_api = if let Some(ref ns) = ctx.watch_namespace {
        Api::<KlusterletAddonConfig>::namespaced(ctx.client.clone(), ns)
    } else {
        Api::<KlusterletAddonConfig>::all(ctx.client.clone())
    };
    if let Ok(list) = gauge_api.list(&ListParams::default()).await {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for config in &list.items {
            *counts.entry(config.namespace().unwrap_or_default()).or_default() += 1;
        }
        for (ns, count) in &counts {
            set_managed_configs(ns, *count);
        }
    }
}

fn has_finalizer<K: ResourceExt>(obj: &K) -> bool {
    obj.finalizers().iter().any(|f| f == ADDON_FINALIZER)
}

async fn add_finalizer<K>(api: &Api<K>, obj: &K) -> Result<(), kube::Error>
where
    K: Resource + ResourceExt + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(ADDON_FINALIZER.to_string());
    set_finalizers(api, &obj.name_any(), obj.resource_version(), finalizers).await
}

async fn remove_finalizer<K>(api: &Api<K>, obj: &K) -> Result<(), kube::Error>
where
    K: Resource + ResourceExt + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| *f != ADDON_FINALIZER)
        .cloned()
        .collect();
    set_finalizers(api, &obj.name_any(), obj.resource_version(), finalizers).await
}

async fn set_finalizers<K>(
    api: &Api<K>,
    name: &str,
    resource_version: Option<String>,
    finalizers: Vec<String>,
) -> Result<(), kube::Error>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    // The resourceVersion turns a lost race with a concurrent finalizer
    // writer into a 409 instead of a silent overwrite.
    let patch = json!({
        "metadata": { "finalizers": finalizers, "resourceVersion": resource_version }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409)
}

fn chrono_now() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
