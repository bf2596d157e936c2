//! Readiness of per-node pods.
//!
//! Used for workloads that run one pod on each selected node: every expected
//! node must have its pod, and each pod must be running and ready or have
//! already run to completion.

use crate::error::{convert_error, ControlError};
use crate::meta::format_meta;
use crate::pods::{label_selector, PodSet};
use cluster_client::ClusterClientTrait;
use k8s_openapi::api::core::v1::{Node, Pod, PodSpec};
use tracing::{info, Span};

const PHASE_RUNNING: &str = "Running";
const PHASE_SUCCEEDED: &str = "Succeeded";
const PHASE_FAILED: &str = "Failed";
const CONDITION_READY: &str = "Ready";

/// Outcome of a readiness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodReadiness {
    /// Every pod is running and ready (some may have completed)
    Ready,
    /// At least one pod is running but not ready yet
    NotReady,
    /// Every pod has already run to completion
    Completed,
}

/// Evaluate the pods in `pods` against the expected `nodes`.
///
/// A node without a pod is `NotFound`; a pod that is neither running nor
/// finished is `CompareFailed`. All expected nodes are examined.
pub fn check_running_and_ready(
    pods: &PodSet,
    nodes: &[Node],
    span: &Span,
) -> Result<PodReadiness, ControlError> {
    if nodes.is_empty() {
        return Err(ControlError::NotFound(format!(
            "no nodes to check {} pods against",
            pods.len()
        )));
    }

    let mut completed = 0;
    let mut not_ready = false;
    for node in nodes {
        let node_name = node.metadata.name.as_deref().unwrap_or_default();
        let Some(pod) = pods.get(node_name) else {
            info!(parent: span, "no pod found on node {}", node_name);
            return Err(ControlError::NotFound(format!("no pod found on node {}", node_name)));
        };

        let meta = format_meta(&pod.metadata);
        let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("Unknown");
        match phase {
            PHASE_FAILED | PHASE_SUCCEEDED => {
                info!(parent: span, "node {}: pod {} is {:?}", node_name, meta, phase);
                completed += 1;
            }
            PHASE_RUNNING => {
                if is_pod_ready(pod) {
                    info!(parent: span, "node {}: pod {} is up and running", node_name, meta);
                } else {
                    not_ready = true;
                }
            }
            _ => {
                return Err(ControlError::CompareFailed(format!(
                    "pod {} is not running yet, status: {:?}, ready: false",
                    meta, phase
                )));
            }
        }
    }

    if not_ready {
        Ok(PodReadiness::NotReady)
    } else if completed == nodes.len() {
        Ok(PodReadiness::Completed)
    } else {
        Ok(PodReadiness::Ready)
    }
}

/// Succeeds when the pods are ready or have completed
pub fn check_running(pods: &PodSet, nodes: &[Node], span: &Span) -> Result<(), ControlError> {
    match check_running_and_ready(pods, nodes, span)? {
        PodReadiness::Ready | PodReadiness::Completed => Ok(()),
        PodReadiness::NotReady => Err(ControlError::CompareFailed(
            "pods are running but not ready yet".to_string(),
        )),
    }
}

/// True if the pod's `Ready` condition is `True`
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == CONDITION_READY))
        .is_some_and(|condition| condition.status == "True")
}

/// Node label selector for the nodes a pod spec can be scheduled on
pub fn node_selector(spec: &PodSpec) -> String {
    spec.node_selector.as_ref().map(label_selector).unwrap_or_default()
}

/// List the nodes a pod spec's node selector matches
pub async fn expected_nodes(
    client: &dyn ClusterClientTrait,
    spec: &PodSpec,
) -> Result<Vec<Node>, ControlError> {
    client.list_nodes(&node_selector(spec)).await.map_err(convert_error)
}
