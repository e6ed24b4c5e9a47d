use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use serde_json::json;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;

use addon_crds::{
    ADDON_NAME_LABEL, AddonRegistry, CLUSTER_NAME_LABEL, KUBE_API_CLIENT_SIGNER, ManagedCluster,
    addon_subject_organization, hub_agent_user_prefix,
};

use crate::context::Context;
use crate::metrics::increment_csr_reconcile_total;

/// Polling interval while a matching request waits on cluster acceptance.
const ACCEPTANCE_REQUEUE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

pub async fn run(server_state: crate::server::ServerState) -> Result<()> {
    let client = Client::try_default().await?;
    let ctx = Arc::new(Context::new(client.clone()));

    let csrs = Api::<CertificateSigningRequest>::all(client.clone());

    info!("Starting addon CSR controller");
    server_state.set_ready();

    Controller::new(csrs, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!(?o, "csr reconciled"),
                Err(e) => error!(%e, "csr reconcile error"),
            }
        })
        .await;

    Ok(())
}

/// What a certificate request claims to be, once every predicate has passed.
#[derive(Debug, PartialEq, Eq)]
pub struct CsrClaim {
    pub cluster: String,
    pub addon: String,
}

pub async fn reconcile(
    csr: Arc<CertificateSigningRequest>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = csr.name_any();

    // Any existing condition means the request was already decided, by us or
    // by someone else. Approval is one-way; never touch it again.
    let already_decided = csr
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|c| !c.is_empty());
    if already_decided {
        return Ok(Action::await_change());
    }

    let Some(claim) = evaluate(&csr, &ctx.registry) else {
        // Not an addon agent request we vouch for; leave it alone.
        increment_csr_reconcile_total("ignored");
        return Ok(Action::await_change());
    };

    let clusters = Api::<ManagedCluster>::all(ctx.client.clone());
    let accepted = clusters
        .get_opt(&claim.cluster)
        .await
        .map_err(Error::Kube)?
        .map(|cluster| cluster.accepted())
        .unwrap_or(false);

    if !accepted {
        // Acceptance may still happen; check back rather than rejecting.
        debug!(%name, cluster = %claim.cluster, "cluster not accepted yet, requeuing");
        increment_csr_reconcile_total("pending");
        return Ok(Action::requeue(ACCEPTANCE_REQUEUE));
    }

    approve(&Api::all(ctx.client.clone()), &name, &claim).await?;
    info!(%name, cluster = %claim.cluster, addon = %claim.addon, "approved addon agent csr");
    increment_csr_reconcile_total("approved");
    Ok(Action::await_change())
}

pub fn error_policy(
    _csr: Arc<CertificateSigningRequest>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    increment_csr_reconcile_total("error");
    warn!(%error, "csr reconciliation failed, requeuing");
    Action::requeue(Duration::from_secs(60))
}

/// Apply every predicate; `None` means the request is simply not ours.
///
/// A request qualifies when it carries both addressing labels, comes from
/// the cluster's hub-scoped agent identity, names a known addon that
/// authenticates against the hub, asks the client-auth signer, and embeds
/// the expected subject pattern in its organization and common name.
pub fn evaluate(
    csr: &CertificateSigningRequest,
    registry: &AddonRegistry,
) -> Option<CsrClaim> {
    let labels = csr.metadata.labels.as_ref()?;
    let cluster = labels.get(CLUSTER_NAME_LABEL)?.clone();
    let addon = labels.get(ADDON_NAME_LABEL)?.clone();

    if csr.spec.signer_name != KUBE_API_CLIENT_SIGNER {
        return None;
    }

    let username = csr.spec.username.as_deref()?;
    if !username.starts_with(&hub_agent_user_prefix(&cluster)) {
        return None;
    }

    let cap = registry.get(&addon)?;
    if !cap.requires_hub_kubeconfig {
        return None;
    }

    let expected_org = addon_subject_organization(&cluster, &addon);
    let (_, pem) = parse_x509_pem(&csr.spec.request.0).ok()?;
    let (_, request) = X509CertificationRequest::from_der(&pem.contents).ok()?;
    let subject = &request.certification_request_info.subject;

    let org_matches = subject
        .iter_organization()
        .any(|attr| attr.as_str().is_ok_and(|org| org == expected_org));
    if !org_matches {
        return None;
    }

    let cn_matches = subject
        .iter_common_name()
        .any(|attr| attr.as_str().is_ok_and(|cn| cn.starts_with(&expected_org)));
    if !cn_matches {
        return None;
    }

    Some(CsrClaim { cluster, addon })
}

async fn approve(
    api: &Api<CertificateSigningRequest>,
    name: &str,
    claim: &CsrClaim,
) -> Result<(), Error> {
    let now = Time(k8s_openapi::jiff::Timestamp::now());
    let condition = CertificateSigningRequestCondition {
        type_: "Approved".to_string(),
        status: "True".to_string(),
        reason: Some("AutoApprovedByAddonManager".to_string()),
        message: Some(format!(
            "auto approved addon agent certificate for cluster {} addon {}",
            claim.cluster, claim.addon
        )),
        last_update_time: Some(now.clone()),
        last_transition_time: Some(now),
    };
    let patch = json!({ "status": { "conditions": [condition] } });
    api.patch_approval(name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .map_err(Error::Kube)?;
    Ok(())
}
