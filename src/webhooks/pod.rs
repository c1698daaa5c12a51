//! Sidecar injection for Pods.
//!
//! Appends the proxy container to `spec.containers`, the iptables init
//! container to `spec.initContainers`, and marks the Pod as injected.

use k8s_openapi::api::core::v1::{Container, Pod};
use tracing::{debug, error, info, warn};

use super::decision::{Decision, SpecView, decide};
use super::error::MutationError;
use super::patch::{PatchOperation, append_to_list, set_annotations};
use super::response::MutationOutcome;
use super::{effective_name, status_annotations};
use crate::config::Config;

pub const CONTAINERS_PATH: &str = "/spec/containers";
pub const INIT_CONTAINERS_PATH: &str = "/spec/initContainers";

/// Pull policy forced onto the proxy so a mutable image tag is always refreshed
pub const PROXY_PULL_POLICY: &str = "Always";

/// Build the injection patch for a Pod
pub fn mutate_pod(pod: &Pod, namespace: &str, config: &Config) -> MutationOutcome {
    let name = effective_name(&pod.metadata);

    match decide(SpecView::Pod, &pod.metadata, config, namespace) {
        Decision::Allow => {}
        Decision::Skip => {
            debug!(pod = %name, namespace = %namespace, "Skipping mutation");
            return MutationOutcome::skipped();
        }
        Decision::Reject(e) => {
            warn!(pod = %name, namespace = %namespace, reason = e.reason(), error = %e, "Pod rejected");
            return MutationOutcome::denied(&e);
        }
    }

    match build_patch(pod, config) {
        Ok(ops) => {
            info!(pod = %name, namespace = %namespace, patch_ops = ops.len(), "Generated patch");
            MutationOutcome::patched(ops)
        }
        Err(e) => {
            error!(pod = %name, namespace = %namespace, error = %e, "Failed to generate patch");
            MutationOutcome::denied(&e)
        }
    }
}

/// Proxy sidecar from the configured template
pub fn proxy_container(config: &Config) -> Container {
    let mut proxy = config.proxy.clone();
    proxy.image_pull_policy = Some(PROXY_PULL_POLICY.to_string());
    proxy
}

/// iptables init container, copied from the template unchanged
pub fn iptables_container(config: &Config) -> Container {
    config.iptables.clone()
}

fn build_patch(pod: &Pod, config: &Config) -> Result<Vec<PatchOperation>, MutationError> {
    // Every path below hangs off /spec
    let spec = pod.spec.as_ref().ok_or_else(|| MutationError::Decode {
        kind: "Pod",
        message: "object has no spec".to_string(),
    })?;
    let containers = spec.containers.len();
    let init_containers = spec.init_containers.as_ref().map_or(0, Vec::len);

    let mut ops = append_to_list(containers, &[proxy_container(config)], CONTAINERS_PATH)?;
    ops.extend(append_to_list(
        init_containers,
        &[iptables_container(config)],
        INIT_CONTAINERS_PATH,
    )?);
    ops.extend(set_annotations(
        pod.metadata.annotations.as_ref(),
        &status_annotations(config),
    ));
    Ok(ops)
}
