//! Decision engine: should an object be mutated, skipped or rejected?
//!
//! Rules are evaluated in order and the first match wins:
//! 1. `<prefix>/ignore` parses as a boolean: `true` skips, `false` allows
//! 2. `<prefix>/status` is already `injected`: skip
//! 3. (Service) the target port is already present: skip
//! 4. (restricted mode) the `<prefix>/name` subject belongs to another namespace: reject
//! 5. allow

use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::ResourceKind;
use super::error::MutationError;
use crate::config::Config;

/// Value of the status annotation once an object has been mutated
pub const STATUS_INJECTED: &str = "injected";

/// The part of an object's spec the decision depends on
#[derive(Clone, Copy, Debug)]
pub enum SpecView<'a> {
    Pod,
    Service { ports: &'a [ServicePort] },
}

impl SpecView<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            SpecView::Pod => ResourceKind::Pod,
            SpecView::Service { .. } => ResourceKind::Service,
        }
    }
}

/// Outcome of the decision engine
#[derive(Debug)]
pub enum Decision {
    Allow,
    Skip,
    Reject(MutationError),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip)
    }
}

/// Decide what to do with an object in `namespace`
pub fn decide(
    view: SpecView<'_>,
    metadata: &ObjectMeta,
    config: &Config,
    namespace: &str,
) -> Decision {
    let keys = config.annotation_keys();

    let ignore = annotation(metadata, &keys.ignore);
    if !ignore.is_empty() {
        return match parse_bool(ignore) {
            Some(true) => Decision::Skip,
            Some(false) => Decision::Allow,
            None => Decision::Reject(MutationError::InvalidBoolean {
                key: keys.ignore,
                value: ignore.to_string(),
            }),
        };
    }

    if annotation(metadata, &keys.status) == STATUS_INJECTED {
        return Decision::Skip;
    }

    if let SpecView::Service { ports } = view {
        if ports.iter().any(|p| p.port == config.service_port.port) {
            return Decision::Skip;
        }
    }

    if config.restrict_certificates_to_namespace {
        let subject = annotation(metadata, &keys.name);
        if let Err(e) = check_namespace_scope(subject, namespace, config.cluster_domain()) {
            return Decision::Reject(e);
        }
    }

    Decision::Allow
}

/// Annotation value, empty when absent
fn annotation<'a>(metadata: &'a ObjectMeta, key: &str) -> &'a str {
    metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
        .unwrap_or_default()
}

/// Reject subjects that name a cluster service outside `namespace`.
///
/// Subjects that are not service DNS names (no `.svc` or
/// `.svc.<cluster domain>` suffix) are not checked.
pub fn check_namespace_scope(
    subject: &str,
    namespace: &str,
    cluster_domain: &str,
) -> Result<(), MutationError> {
    let subject = subject.trim_end_matches('.');

    let short_foreign =
        subject.ends_with(".svc") && !subject.ends_with(&format!(".{namespace}.svc"));
    let fqdn_foreign = subject.ends_with(&format!(".svc.{cluster_domain}"))
        && !subject.ends_with(&format!(".{namespace}.svc.{cluster_domain}"));

    if short_foreign || fqdn_foreign {
        return Err(MutationError::Validation {
            subject: subject.to_string(),
            namespace: namespace.to_string(),
        });
    }
    Ok(())
}

/// Parse a boolean the way Kubernetes tooling conventionally does
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
