//! pmsm-webhook library crate
//!
//! Mutating admission webhook that injects a sidecar proxy and an iptables
//! init container into Pods, and a management port into Services.

pub mod config;
pub mod health;
pub mod tls;
pub mod webhooks;

pub use config::{Config, ConfigError};
pub use health::HealthState;
pub use tls::{TlsError, TrustStore};
pub use webhooks::{
    AdmissionObject, Decision, MutationError, MutationOutcome, ResourceKind, WEBHOOK_CERT_PATH,
    WEBHOOK_KEY_PATH, WebhookError, WebhookState, run_webhook_server,
};
