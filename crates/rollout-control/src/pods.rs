//! Pod collection by owner.
//!
//! Pods of a workload are found by listing on the workload's selector labels
//! and then keeping only those whose `kubernetes.io/created-by` annotation
//! names the exact owner instance. Label matches alone are not enough: an
//! older generation of the same workload carries identical labels.
//!
//! Pods are keyed by the node they are bound to, one pod per node. A second
//! pod on the same node replaces the first, which suits node-exclusive
//! workloads only.

use crate::error::{convert_error, ControlError};
use crate::meta::format_meta;
use cluster_client::{ClusterClientTrait, SerializedReference, ANNOTATION_CREATED_BY};
use k8s_openapi::api::core::v1::{ObjectReference, Pod};
use std::collections::BTreeMap;
use tracing::{debug, info, warn, Span};

/// Pods keyed by node name
pub type PodSet = BTreeMap<String, Pod>;

/// Build an equality label selector (`k1=v1,k2=v2`). An empty map selects everything.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a `kubernetes.io/created-by` annotation value into the owner reference
pub fn parse_serialized_reference(data: &str) -> Result<ObjectReference, ControlError> {
    serde_json::from_str::<SerializedReference>(data)
        .map(|serialized| serialized.reference)
        .map_err(|e| {
            ControlError::BadParameter(format!(
                "failed to parse {} annotation: {}",
                ANNOTATION_CREATED_BY, e
            ))
        })
}

/// Collect the pods in `namespace` matching `match_labels` whose creator
/// satisfies `owned_by`.
///
/// Pods without the created-by annotation are skipped. A malformed
/// annotation is logged and the pod skipped.
pub async fn collect_pods<P>(
    client: &dyn ClusterClientTrait,
    namespace: &str,
    match_labels: Option<&BTreeMap<String, String>>,
    span: &Span,
    owned_by: P,
) -> Result<PodSet, ControlError>
where
    P: Fn(&ObjectReference) -> bool,
{
    let selector = match_labels.map(label_selector).unwrap_or_default();
    let pod_list = client.list_pods(namespace, &selector).await.map_err(convert_error)?;

    let mut pods = PodSet::new();
    for pod in pod_list {
        let Some(created_by) = pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(ANNOTATION_CREATED_BY))
        else {
            continue;
        };

        let reference = match parse_serialized_reference(created_by) {
            Ok(reference) => reference,
            Err(e) => {
                warn!(parent: span, "skipping pod {}: {}", format_meta(&pod.metadata), e);
                continue;
            }
        };

        if owned_by(&reference) {
            let node = pod
                .spec
                .as_ref()
                .and_then(|spec| spec.node_name.clone())
                .unwrap_or_default();
            info!(parent: span, "found pod {} on node {}", format_meta(&pod.metadata), node);
            pods.insert(node, pod);
        }
    }
    Ok(pods)
}

/// Delete every pod in `pods`. Pods that are already gone count as deleted.
pub async fn delete_pods(
    client: &dyn ClusterClientTrait,
    namespace: &str,
    pods: &PodSet,
    span: &Span,
) -> Result<(), ControlError> {
    for pod in pods.values() {
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        let pod_namespace = pod.metadata.namespace.as_deref().unwrap_or(namespace);
        info!(parent: span, "deleting pod {}", format_meta(&pod.metadata));
        match client.delete_pod(pod_namespace, name).await.map_err(convert_error) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(parent: span, "pod {} already deleted", name),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
