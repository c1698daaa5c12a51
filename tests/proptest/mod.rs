// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for pmsm-webhook.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/mod.rs"]
mod common;

use proptest::prelude::*;
use serde_json::json;

use pmsm_webhook::Config;
use pmsm_webhook::webhooks::decision::check_namespace_scope;
use pmsm_webhook::webhooks::patch::to_json_patch;
use pmsm_webhook::webhooks::pod::mutate_pod;
use pmsm_webhook::webhooks::service::mutate_service;
use pmsm_webhook::webhooks::{PatchOperation, escape_json_pointer};

use common::{MGMT_PORT, PodBuilder, ServiceBuilder, apply, test_config};

/// Strategy for DNS labels.
fn dns_label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,14}[a-z0-9]"
}

/// Strategy for annotation keys, including JSON pointer metacharacters.
fn annotation_key() -> impl Strategy<Value = String> {
    "[a-z~/.]{1,12}"
}

/// Strategy for port numbers other than the management port.
fn app_port() -> impl Strategy<Value = i32> {
    (1..=65535i32).prop_filter("not the management port", |p| *p != MGMT_PORT)
}

proptest! {
    /// Adding a key through an escaped pointer sets exactly that key.
    #[test]
    fn escaped_pointer_addresses_the_key(key in annotation_key()) {
        let mut doc = json!({"metadata": {"annotations": {"existing": "x"}}});
        let op = PatchOperation::add(
            format!("/metadata/annotations/{}", escape_json_pointer(&key)),
            json!("v"),
        );
        let patch = to_json_patch(&[op]).unwrap();
        json_patch::patch(&mut doc, &patch.0).unwrap();

        prop_assert_eq!(&doc["metadata"]["annotations"][key.as_str()], &json!("v"));
    }

    /// Escaping leaves no bare `/` and no `~` outside an escape sequence.
    #[test]
    fn escaped_pointer_is_one_segment(key in annotation_key()) {
        let escaped = escape_json_pointer(&key);
        prop_assert!(!escaped.contains('/'));
        let unescaped = escaped.replace("~1", "/").replace("~0", "~");
        prop_assert_eq!(unescaped, key);
    }

    /// Service subjects in the object's own namespace are always accepted.
    #[test]
    fn own_namespace_subject_accepted(
        name in dns_label(),
        ns in dns_label(),
        fqdn in any::<bool>(),
        trailing_dot in any::<bool>(),
    ) {
        let mut subject = format!("{name}.{ns}.svc");
        if fqdn {
            subject.push_str(".cluster.local");
        }
        if trailing_dot {
            subject.push('.');
        }
        prop_assert!(check_namespace_scope(&subject, &ns, "cluster.local").is_ok());
    }

    /// Service subjects in another namespace are always rejected.
    #[test]
    fn foreign_namespace_subject_rejected(
        name in dns_label(),
        ns in dns_label(),
        other in dns_label(),
        fqdn in any::<bool>(),
    ) {
        prop_assume!(other != ns);
        let mut subject = format!("{name}.{other}.svc");
        if fqdn {
            subject.push_str(".cluster.local");
        }
        prop_assert!(check_namespace_scope(&subject, &ns, "cluster.local").is_err());
    }

    /// A patched Pod is never patched again.
    #[test]
    fn pod_mutation_is_idempotent(
        containers in prop::collection::vec(dns_label(), 0..4),
        extra in prop::collection::btree_map(annotation_key(), "[a-z]{0,8}", 0..3),
    ) {
        let config = test_config();
        let mut builder = PodBuilder::new("web");
        for name in &containers {
            builder = builder.container(name);
        }
        for (key, value) in &extra {
            if !key.starts_with("pmsm/") {
                builder = builder.annotation(key.clone(), value.clone());
            }
        }
        let pod = builder.build();

        let first = mutate_pod(&pod, "ns1", &config);
        prop_assert!(first.is_patched());

        let patched = apply(&pod, &first.patch);
        let spec = patched.spec.clone().unwrap();
        prop_assert_eq!(spec.containers.len(), containers.len() + 1);

        let second = mutate_pod(&patched, "ns1", &config);
        prop_assert!(second.allowed);
        prop_assert!(second.patch.is_empty());
    }

    /// A patched Service gains exactly one port and is never patched again.
    #[test]
    fn service_mutation_is_idempotent(ports in prop::collection::btree_set(app_port(), 0..4)) {
        let config: Config = test_config();
        let mut builder = ServiceBuilder::new("web");
        for port in &ports {
            builder = builder.port(&format!("p{port}"), *port, "TCP");
        }
        let service = builder.build();

        let first = mutate_service(&service, "ns1", &config);
        let patched = apply(&service, &first.patch);
        let patched_ports = patched.spec.clone().unwrap().ports.unwrap();
        prop_assert_eq!(patched_ports.len(), ports.len() + 1);
        prop_assert_eq!(patched_ports.last().unwrap().port, MGMT_PORT);

        let second = mutate_service(&patched, "ns1", &config);
        prop_assert!(second.patch.is_empty());
    }
}
