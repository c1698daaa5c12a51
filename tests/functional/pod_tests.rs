//! Pod sidecar injection, checked by applying the generated patch.

use k8s_openapi::api::core::v1::Pod;
use pmsm_webhook::Config;
use pmsm_webhook::webhooks::pod::{PROXY_PULL_POLICY, mutate_pod};

use crate::common::{PodBuilder, apply, restricted_config, test_config};

fn container_names(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .unwrap()
        .containers
        .iter()
        .map(|c| c.name.clone())
        .collect()
}

fn init_container_names(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .unwrap()
        .init_containers
        .iter()
        .flatten()
        .map(|c| c.name.clone())
        .collect()
}

fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

#[test]
fn test_pod_gets_sidecar_and_init_container() {
    let config = test_config();
    let pod = PodBuilder::generated("web-").container("app").build();

    let outcome = mutate_pod(&pod, "ns1", &config);
    assert!(outcome.is_patched());

    let patched = apply(&pod, &outcome.patch);
    assert_eq!(container_names(&patched), ["app", "pmsm-proxy"]);
    assert_eq!(init_container_names(&patched), ["pmsm-iptables"]);
    assert_eq!(annotation(&patched, "pmsm/status"), Some("injected"));
}

#[test]
fn test_existing_containers_keep_their_order() {
    let config = test_config();
    let pod = PodBuilder::new("web")
        .container("app")
        .container("logger")
        .init_container("migrate")
        .build();

    let patched = apply(&pod, &mutate_pod(&pod, "ns1", &config).patch);
    assert_eq!(container_names(&patched), ["app", "logger", "pmsm-proxy"]);
    assert_eq!(init_container_names(&patched), ["migrate", "pmsm-iptables"]);
}

#[test]
fn test_proxy_is_always_pulled() {
    let config = test_config();
    let pod = PodBuilder::new("web").container("app").build();

    let patched = apply(&pod, &mutate_pod(&pod, "ns1", &config).patch);
    let proxy = patched
        .spec
        .unwrap()
        .containers
        .into_iter()
        .find(|c| c.name == "pmsm-proxy")
        .unwrap();
    assert_eq!(proxy.image_pull_policy.as_deref(), Some(PROXY_PULL_POLICY));
    assert_eq!(proxy.image, config.proxy.image);
}

#[test]
fn test_pod_remutation_is_noop() {
    let config = test_config();
    let pod = PodBuilder::new("web")
        .container("app")
        .annotation("team", "payments")
        .build();

    let first = mutate_pod(&pod, "ns1", &config);
    let patched = apply(&pod, &first.patch);
    assert_eq!(annotation(&patched, "team"), Some("payments"));

    let second = mutate_pod(&patched, "ns1", &config);
    assert!(second.allowed);
    assert!(second.patch.is_empty());
}

#[test]
fn test_ignore_true_beats_foreign_subject() {
    let config = restricted_config();
    let pod = PodBuilder::new("web")
        .container("app")
        .annotation("pmsm/ignore", "true")
        .annotation("pmsm/name", "web.other.svc")
        .build();

    let outcome = mutate_pod(&pod, "ns1", &config);
    assert!(outcome.allowed);
    assert!(outcome.patch.is_empty());
}

#[test]
fn test_ignore_false_forces_injection() {
    let config = restricted_config();
    let pod = PodBuilder::new("web")
        .container("app")
        .annotation("pmsm/ignore", "false")
        .annotation("pmsm/name", "web.other.svc")
        .build();

    let outcome = mutate_pod(&pod, "ns1", &config);
    assert!(outcome.is_patched());
}

#[test]
fn test_invalid_ignore_value_is_denied() {
    let config = test_config();
    let pod = PodBuilder::new("web")
        .container("app")
        .annotation("pmsm/ignore", "maybe")
        .build();

    let outcome = mutate_pod(&pod, "ns1", &config);
    assert!(!outcome.allowed);
    let message = outcome.error_message.unwrap();
    assert!(message.contains("pmsm/ignore"));
    assert!(message.contains("maybe"));
}

#[test]
fn test_subject_in_own_namespace_is_patched() {
    let config = restricted_config();
    for subject in [
        "web.ns1.svc",
        "web.ns1.svc.",
        "web.ns1.svc.cluster.local",
        "web.example.com",
        "",
    ] {
        let pod = PodBuilder::new("web")
            .container("app")
            .annotation("pmsm/name", subject)
            .build();
        let outcome = mutate_pod(&pod, "ns1", &config);
        assert!(outcome.is_patched(), "subject {subject:?} should be accepted");
    }
}

#[test]
fn test_subject_in_foreign_namespace_is_denied() {
    let config = restricted_config();
    for subject in ["web.ns2.svc", "web.ns2.svc.cluster.local", "web.ns2.svc.cluster.local."] {
        let pod = PodBuilder::new("web")
            .container("app")
            .annotation("pmsm/name", subject)
            .build();
        let outcome = mutate_pod(&pod, "ns1", &config);
        assert!(!outcome.allowed, "subject {subject:?} should be rejected");
        let message = outcome.error_message.unwrap();
        assert!(message.contains("ns1"));
        assert!(message.contains("restrictCertificatesToNamespace"));
    }
}

#[test]
fn test_foreign_subject_allowed_when_unrestricted() {
    let config = test_config();
    let pod = PodBuilder::new("web")
        .container("app")
        .annotation("pmsm/name", "web.ns2.svc")
        .build();

    assert!(mutate_pod(&pod, "ns1", &config).is_patched());
}

#[test]
fn test_custom_prefix_with_reserved_pointer_characters() {
    let config = Config {
        annotation_prefix: Some("mesh~io/v1".to_string()),
        ..test_config()
    };
    let pod = PodBuilder::new("web")
        .container("app")
        .annotation("team", "payments")
        .build();

    let outcome = mutate_pod(&pod, "ns1", &config);
    assert!(
        outcome
            .patch
            .iter()
            .any(|op| op.path == "/metadata/annotations/mesh~0io~1v1~1status")
    );

    let patched = apply(&pod, &outcome.patch);
    assert_eq!(annotation(&patched, "mesh~io/v1/status"), Some("injected"));
    assert_eq!(annotation(&patched, "team"), Some("payments"));

    let again = mutate_pod(&patched, "ns1", &config);
    assert!(again.patch.is_empty());
}
