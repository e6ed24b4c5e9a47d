use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use addon_crds::{KlusterletAddonConfig, ProxyPolicy};
use addon_images::ImageManifests;

use crate::context::load_image_manifests;

const DEFAULT_WEBHOOK_PORT: u16 = 9443;

/// Configuration for the webhook server.
#[derive(Clone)]
pub struct WebhookConfig {
    pub port: u16,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        let port = match std::env::var("WEBHOOK_PORT") {
            Ok(s) => match s.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "using WEBHOOK_PORT from env");
                    p
                }
                Err(e) => {
                    warn!(value = %s, error = %e, "invalid WEBHOOK_PORT, using default {DEFAULT_WEBHOOK_PORT}");
                    DEFAULT_WEBHOOK_PORT
                }
            },
            Err(_) => DEFAULT_WEBHOOK_PORT,
        };
        Self { port }
    }
}

#[derive(Clone)]
struct WebhookState {
    images: Arc<ImageManifests>,
}

// --- Admission API types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionReview {
    api_version: String,
    kind: String,
    request: Option<AdmissionRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionRequest {
    uid: String,
    #[serde(default)]
    operation: String,
    object: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionReviewResponse {
    api_version: String,
    kind: String,
    response: AdmissionResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionResponse {
    uid: String,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<AdmissionStatus>,
}

#[derive(Serialize)]
struct AdmissionStatus {
    message: String,
}

/// Start the validating webhook server.
///
/// Listens for `POST /validate-klusterletaddonconfig` with AdmissionReview
/// payloads. TLS termination is expected to be handled externally (e.g. by
/// a sidecar or service mesh). Set `WEBHOOK_PORT` to override the default
/// port 9443.
pub async fn run(config: WebhookConfig) -> anyhow::Result<()> {
    let state = Arc::new(WebhookState {
        images: Arc::new(load_image_manifests()),
    });
    let app = Router::new()
        .route("/validate-klusterletaddonconfig", post(validate_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "starting webhook server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview>,
) -> impl IntoResponse {
    let request = match review.request {
        Some(req) => req,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "missing request"})),
            );
        }
    };

    let verdict = match serde_json::from_value::<KlusterletAddonConfig>(request.object.clone()) {
        Ok(config) => validate_config(&config, &state.images),
        Err(e) => Err(format!("not a valid KlusterletAddonConfig: {e}")),
    };

    let response = match verdict {
        Ok(()) => AdmissionResponse {
            uid: request.uid,
            allowed: true,
            status: None,
        },
        Err(message) => {
            debug!(operation = %request.operation, %message, "denying config");
            AdmissionResponse {
                uid: request.uid,
                allowed: false,
                status: Some(AdmissionStatus { message }),
            }
        }
    };

    (
        StatusCode::OK,
        Json(
            serde_json::to_value(AdmissionReviewResponse {
                api_version: review.api_version,
                kind: review.kind,
                response,
            })
            .unwrap_or_default(),
        ),
    )
}

/// The validation the front door applies before a config is persisted.
///
/// An empty manifest set cannot prove a version wrong, so it admits
/// everything; resolution failures then surface at reconcile time.
fn validate_config(config: &KlusterletAddonConfig, images: &ImageManifests) -> Result<(), String> {
    if config.spec.version.is_empty() {
        return Err("spec.version must be set".to_string());
    }
    if !images.is_empty() && !images.supports(&config.spec.version) {
        return Err(format!(
            "spec.version {} is not served by any loaded image manifest",
            config.spec.version
        ));
    }

    let custom_proxy_without_config = config.spec.proxy_config.is_none()
        && [
            &config.spec.application_manager,
            &config.spec.cert_policy_controller,
            &config.spec.iam_policy_controller,
            &config.spec.policy_controller,
            &config.spec.search_collector,
        ]
        .iter()
        .any(|addon| addon.enabled && addon.proxy_policy == ProxyPolicy::CustomProxy);
    if custom_proxy_without_config {
        return Err(
            "proxyPolicy CustomProxy requires spec.proxyConfig to be set".to_string(),
        );
    }

    Ok(())
}
