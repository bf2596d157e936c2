//! Wire models that are not covered by `k8s-openapi`

use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::DeleteParams;
use serde::{Deserialize, Serialize};

/// Pod annotation recording which controller-managed object created the pod
pub const ANNOTATION_CREATED_BY: &str = "kubernetes.io/created-by";

/// Content of the `kubernetes.io/created-by` annotation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub reference: ObjectReference,
}

impl SerializedReference {
    /// Reference to the object `kind`/`name` with the given UID
    pub fn new(kind: &str, namespace: &str, name: &str, uid: &str) -> Self {
        Self {
            kind: Some("SerializedReference".to_string()),
            api_version: Some("v1".to_string()),
            reference: ObjectReference {
                kind: Some(kind.to_string()),
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
        }
    }

    /// Serialize to the annotation value
    pub fn to_annotation(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Propagation policy for delete requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePropagation {
    /// Leave dependents running without an owner
    Orphan,
    /// Delete the owner now, dependents afterwards
    Background,
    /// Delete dependents before the owner disappears
    Foreground,
}

/// Build delete parameters; `None` leaves the choice to the server
pub fn delete_params(propagation: Option<DeletePropagation>) -> DeleteParams {
    match propagation {
        Some(DeletePropagation::Orphan) => DeleteParams::orphan(),
        Some(DeletePropagation::Background) => DeleteParams::background(),
        Some(DeletePropagation::Foreground) => DeleteParams::foreground(),
        None => DeleteParams::default(),
    }
}
