//! Management port injection for Services.
//!
//! Ports are appended incrementally: existing ports never appear in the
//! patch, apart from a single unnamed port whose name is filled in so the
//! Service stays valid once it has more than one port.

use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::decision::{Decision, SpecView, decide};
use super::error::MutationError;
use super::patch::{PatchOperation, append_to_list, set_annotations};
use super::response::MutationOutcome;
use super::{effective_name, status_annotations};
use crate::config::Config;

pub const PORTS_PATH: &str = "/spec/ports";

/// Protocol of the injected port, and of any port without an explicit one
pub const DEFAULT_PROTOCOL: &str = "TCP";

/// Build the port injection patch for a Service
pub fn mutate_service(service: &Service, namespace: &str, config: &Config) -> MutationOutcome {
    let name = effective_name(&service.metadata);
    let ports = service_ports(service);

    match decide(SpecView::Service { ports }, &service.metadata, config, namespace) {
        Decision::Allow => {}
        Decision::Skip => {
            debug!(service = %name, namespace = %namespace, "Skipping mutation");
            return MutationOutcome::skipped();
        }
        Decision::Reject(e) => {
            warn!(service = %name, namespace = %namespace, reason = e.reason(), error = %e, "Service rejected");
            return MutationOutcome::denied(&e);
        }
    }

    match build_patch(service, config) {
        Ok(ops) => {
            info!(service = %name, namespace = %namespace, patch_ops = ops.len(), "Generated patch");
            MutationOutcome::patched(ops)
        }
        Err(e) => {
            error!(service = %name, namespace = %namespace, error = %e, "Failed to generate patch");
            MutationOutcome::denied(&e)
        }
    }
}

/// The management port from configuration
pub fn target_port(config: &Config) -> ServicePort {
    ServicePort {
        name: Some(config.service_port.name.clone()),
        port: config.service_port.port,
        protocol: Some(DEFAULT_PROTOCOL.to_string()),
        target_port: Some(IntOrString::Int(config.service_port.port)),
        ..Default::default()
    }
}

/// Name derived for an unnamed port, e.g. `tcp-8080`
pub fn derived_port_name(port: &ServicePort) -> String {
    let protocol = port.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL);
    format!("{}-{}", protocol.to_lowercase(), port.port)
}

fn service_ports(service: &Service) -> &[ServicePort] {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or_default()
}

/// Name a lone unnamed port in place.
///
/// `replace` needs the member to exist, so a port serialized without a
/// `name` member gets an `add` instead.
fn repair_port_name(ports: &[ServicePort]) -> Option<PatchOperation> {
    let [port] = ports else {
        return None;
    };

    let path = format!("{PORTS_PATH}/0/name");
    let name = Value::String(derived_port_name(port));
    match port.name.as_deref() {
        None => Some(PatchOperation::add(path, name)),
        Some("") => Some(PatchOperation::replace(path, name)),
        Some(_) => None,
    }
}

fn build_patch(service: &Service, config: &Config) -> Result<Vec<PatchOperation>, MutationError> {
    if service.spec.is_none() {
        return Err(MutationError::Decode {
            kind: "Service",
            message: "object has no spec".to_string(),
        });
    }
    let ports = service_ports(service);

    let mut ops: Vec<PatchOperation> = repair_port_name(ports).into_iter().collect();
    ops.extend(append_to_list(ports.len(), &[target_port(config)], PORTS_PATH)?);
    ops.extend(set_annotations(
        service.metadata.annotations.as_ref(),
        &status_annotations(config),
    ));
    Ok(ops)
}
