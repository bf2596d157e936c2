//! Object identity helpers and well-known names

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{Metadata, Resource};
use std::collections::BTreeMap;
use std::fmt;

pub const KIND_JOB: &str = "Job";
pub const BATCH_API_VERSION: &str = "batch/v1";
pub const DEFAULT_NAMESPACE: &str = "default";

/// Selector/template labels the job controller injects on creation
pub const CONTROLLER_UID_LABELS: [&str; 2] =
    ["controller-uid", "batch.kubernetes.io/controller-uid"];

/// Identity of one remote object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub kind: String,
    pub api_version: String,
    pub namespace: String,
    pub name: String,
    /// Server-assigned, cleared before re-creating
    pub uid: Option<String>,
    pub resource_version: Option<String>,
    pub self_link: Option<String>,
}

impl ResourceDescriptor {
    /// Descriptor of `object`; kind and api version come from its type
    pub fn from_object<K>(object: &K) -> Self
    where
        K: Resource + Metadata<Ty = ObjectMeta>,
    {
        let meta = object.metadata();
        Self {
            kind: K::KIND.to_string(),
            api_version: K::API_VERSION.to_string(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
            uid: meta.uid.clone(),
            resource_version: meta.resource_version.clone(),
            self_link: meta.self_link.clone(),
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// `namespace/name` of an object, or just the name when it has no namespace
pub fn format_meta(meta: &ObjectMeta) -> String {
    let name = meta.name.as_deref().unwrap_or_default();
    match meta.namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => format!("{}/{}", namespace, name),
        _ => name.to_string(),
    }
}

/// Clear the server-assigned identity so the object can be created again
pub fn clear_identity(meta: &mut ObjectMeta) {
    meta.uid = None;
    meta.self_link = None;
    meta.resource_version = None;
}

/// Drop the controller-uid labels from a label map
pub fn remove_controller_labels(labels: &mut BTreeMap<String, String>) {
    for label in CONTROLLER_UID_LABELS {
        labels.remove(label);
    }
}
