//! Admission webhook server.
//!
//! Provides HTTPS endpoints for the Kubernetes API server:
//! - `POST /mutate/pod` - sidecar injection
//! - `POST /mutate/service` - management port injection
//!
//! To enable the webhooks:
//! 1. Mount a TLS certificate for the webhook Service at /etc/webhook/certs/
//! 2. Create a MutatingWebhookConfiguration pointing at both paths

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use thiserror::Error;
use tracing::{debug, error, info};

use super::error::MutationError;
use super::response::{MutationOutcome, assemble, decode_failure};
use super::{AdmissionObject, ResourceKind};
use crate::config::{Config, ConfigError};
use crate::health::HealthState;
use crate::tls::TlsError;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";

/// Shared state for webhook handlers
pub struct WebhookState {
    pub config: Arc<Config>,
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(config: Arc<Config>, health: Arc<HealthState>) -> Self {
        Self { config, health }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate/pod", post(mutate_pod))
        .route("/mutate/service", post(mutate_service))
        .with_state(state)
}

async fn mutate_pod(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    handle_review(&state, ResourceKind::Pod, review)
}

async fn mutate_service(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    handle_review(&state, ResourceKind::Service, review)
}

fn handle_review(
    state: &WebhookState,
    kind: ResourceKind,
    review: AdmissionReview<DynamicObject>,
) -> (StatusCode, Json<AdmissionReview<DynamicObject>>) {
    let started = Instant::now();

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, kind = %kind, "Failed to extract admission request");
            state
                .health
                .metrics
                .record_admission(kind.as_str(), "invalid", 0, elapsed(started));
            return (
                StatusCode::BAD_REQUEST,
                Json(AdmissionResponse::invalid(format!("Invalid AdmissionReview: {e}")).into_review()),
            );
        }
    };

    let (response, outcome) = evaluate(&state.config, kind, &request);

    // assemble() can still deny a patched outcome, so the response decides the label
    let (label, patch_ops) = match (response.allowed, response.patch.is_some()) {
        (false, _) => ("denied", 0),
        (true, true) => ("patched", outcome.patch.len()),
        (true, false) => ("skipped", 0),
    };
    state
        .health
        .metrics
        .record_admission(kind.as_str(), label, patch_ops, elapsed(started));

    (StatusCode::OK, Json(response.into_review()))
}

/// Produce the admission response for one request
pub fn admit(
    config: &Config,
    kind: ResourceKind,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    evaluate(config, kind, request).0
}

/// Admission response together with the outcome it was assembled from
fn evaluate(
    config: &Config,
    kind: ResourceKind,
    request: &AdmissionRequest<DynamicObject>,
) -> (AdmissionResponse, MutationOutcome) {
    let uid = &request.uid;
    debug!(
        uid = %uid,
        kind = %kind,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        "Processing admission request"
    );

    // DELETE operations carry no object to mutate
    if request.operation == Operation::Delete {
        info!(uid = %uid, "Admission request allowed (DELETE)");
        return (AdmissionResponse::from(request), MutationOutcome::skipped());
    }

    let Some(raw) = &request.object else {
        let err = MutationError::Decode {
            kind: kind.as_str(),
            message: "missing object in request".to_string(),
        };
        error!(uid = %uid, error = %err, "Missing object in request");
        return (decode_failure(request, &err), MutationOutcome::denied(&err));
    };

    let object = match AdmissionObject::from_dynamic(kind, raw) {
        Ok(object) => object,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to decode admission object");
            return (decode_failure(request, &e), MutationOutcome::denied(&e));
        }
    };

    let namespace = request
        .namespace
        .as_deref()
        .or(object.metadata().namespace.as_deref())
        .unwrap_or_default();

    let outcome = object.mutate(namespace, config);
    info!(uid = %uid, kind = %kind, outcome = outcome.label(), "Admission request handled");
    (assemble(request, &outcome), outcome)
}

fn elapsed(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook config error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsError),

    #[error("webhook server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Run the webhook server with TLS on the configured address.
///
/// The health state is marked ready once the listener is bound. `handle`
/// lets the caller drain in-flight requests with `graceful_shutdown`.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    tls_config: Arc<rustls::ServerConfig>,
    handle: Handle,
) -> Result<(), WebhookError> {
    let addr = state.config.socket_addr()?;
    let health = state.health.clone();
    let app = create_webhook_router(state);

    let listening = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Some(bound) = handle.listening().await {
                info!(address = %bound, "Webhook server listening with TLS");
                health.set_ready(true).await;
            }
        })
    };

    let served = axum_server::bind_rustls(addr, RustlsConfig::from_config(tls_config))
        .handle(handle)
        .serve(app.into_make_service())
        .await;
    listening.abort();
    served?;

    info!("Webhook server stopped");
    Ok(())
}
