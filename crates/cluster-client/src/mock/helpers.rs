//! Builders for the objects mock-based tests need

use crate::models::{SerializedReference, ANNOTATION_CREATED_BY};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Node, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// True when every `key=value` term of `selector` is present in `labels`.
/// An empty selector matches everything.
pub fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels
                .and_then(|l| l.get(key.trim()))
                .is_some_and(|v| v == value.trim()),
            None => false,
        })
}

/// Convert label pairs into a label map
pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Bare job with an empty spec
pub fn job(namespace: &str, name: &str) -> Job {
    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(JobSpec::default()),
        status: None,
    }
}

/// Pod bound to `node`, optionally carrying a created-by annotation for an
/// owner given as `(kind, uid)`
pub fn pod_on_node(
    namespace: &str,
    name: &str,
    node: &str,
    pod_labels: &[(&str, &str)],
    owner: Option<(&str, &str)>,
) -> Pod {
    let annotations = owner.map(|(kind, uid)| {
        let reference = SerializedReference::new(kind, namespace, "owner", uid);
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_CREATED_BY.to_string(),
            reference.to_annotation().unwrap_or_default(),
        );
        annotations
    });
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(pod_labels)),
            annotations,
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node.to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Node with the given labels
pub fn node(name: &str, node_labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(node_labels)),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches() {
        let pod_labels = labels(&[("app", "migrate"), ("tier", "batch")]);
        assert!(selector_matches("", Some(&pod_labels)));
        assert!(selector_matches("app=migrate", Some(&pod_labels)));
        assert!(selector_matches("app=migrate,tier=batch", Some(&pod_labels)));
        assert!(!selector_matches("app=web", Some(&pod_labels)));
        assert!(!selector_matches("app=migrate", None));
    }
}
