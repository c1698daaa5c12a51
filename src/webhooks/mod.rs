//! Mutating admission webhooks for sidecar and management port injection.
//!
//! - Pods get the proxy sidecar and the iptables init container
//! - Services get the management port
//!
//! Both are marked with `<prefix>/status: injected` so repeated admission
//! calls leave them alone.

pub mod decision;
pub mod error;
pub mod patch;
pub mod pod;
pub mod response;
mod server;
pub mod service;

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;

pub use decision::{Decision, STATUS_INJECTED, SpecView, decide};
pub use error::MutationError;
pub use patch::{Op, PatchOperation, escape_json_pointer};
pub use response::MutationOutcome;
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookError, WebhookState, admit, create_webhook_router,
    run_webhook_server,
};

use crate::config::Config;

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};

/// Resource kinds this webhook mutates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Service,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded admission object
#[derive(Clone, Debug)]
pub enum AdmissionObject {
    Pod(Box<Pod>),
    Service(Box<Service>),
}

impl AdmissionObject {
    /// Decode a raw object as `kind`
    pub fn from_value(kind: ResourceKind, value: serde_json::Value) -> Result<Self, MutationError> {
        let decode_error = |e: serde_json::Error| MutationError::Decode {
            kind: kind.as_str(),
            message: e.to_string(),
        };
        Ok(match kind {
            ResourceKind::Pod => Self::Pod(Box::new(
                serde_json::from_value(value).map_err(decode_error)?,
            )),
            ResourceKind::Service => Self::Service(Box::new(
                serde_json::from_value(value).map_err(decode_error)?,
            )),
        })
    }

    /// Decode the object carried by an admission request
    pub fn from_dynamic(kind: ResourceKind, object: &DynamicObject) -> Result<Self, MutationError> {
        let value = serde_json::to_value(object).map_err(|e| MutationError::Decode {
            kind: kind.as_str(),
            message: e.to_string(),
        })?;
        Self::from_value(kind, value)
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            AdmissionObject::Pod(_) => ResourceKind::Pod,
            AdmissionObject::Service(_) => ResourceKind::Service,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            AdmissionObject::Pod(pod) => &pod.metadata,
            AdmissionObject::Service(service) => &service.metadata,
        }
    }

    /// Run the mutator for this object's kind
    pub fn mutate(&self, namespace: &str, config: &Config) -> MutationOutcome {
        match self {
            AdmissionObject::Pod(pod) => pod::mutate_pod(pod, namespace, config),
            AdmissionObject::Service(service) => service::mutate_service(service, namespace, config),
        }
    }
}

/// Object name, falling back to `generateName` for objects not yet named
pub fn effective_name(metadata: &ObjectMeta) -> &str {
    metadata
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .or(metadata.generate_name.as_deref())
        .unwrap_or_default()
}

/// Annotations set on every mutated object
fn status_annotations(config: &Config) -> BTreeMap<String, String> {
    BTreeMap::from([(
        config.annotation_keys().status,
        STATUS_INJECTED.to_string(),
    )])
}
