//! ClusterClient trait for mocking
//!
//! This trait abstracts the cluster API to enable mocking in unit tests.
//! `KubeClusterClient` implements it against a real API server.

use crate::error::ClusterError;
use crate::models::DeletePropagation;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Node, Pod};

/// Trait for cluster API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Jobs

    /// Fetch a job by name
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, ClusterError>;

    /// Create a job in the namespace named by its metadata
    async fn create_job(&self, job: &Job) -> Result<Job, ClusterError>;

    /// Delete a job; `None` leaves the propagation policy to the server
    async fn delete_job(
        &self,
        namespace: &str,
        name: &str,
        propagation: Option<DeletePropagation>,
    ) -> Result<(), ClusterError>;

    // Pods

    /// List pods matching an equality label selector (empty selects all)
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, ClusterError>;

    /// Delete a pod by name
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // Nodes

    /// List nodes matching an equality label selector (empty selects all)
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError>;
}
