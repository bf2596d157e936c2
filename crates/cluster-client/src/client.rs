//! kube-rs backed cluster client

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::models::{delete_params, DeletePropagation};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// Namespace used when an object does not name one
const DEFAULT_NAMESPACE: &str = "default";

const KIND_JOB: &str = "Job";
const KIND_POD: &str = "Pod";

/// Cluster client talking to a real API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster or local kubeconfig
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn list_params(label_selector: &str) -> ListParams {
    if label_selector.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(label_selector)
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, ClusterError> {
        debug!("GET job {}/{}", namespace, name);
        self.jobs(namespace)
            .get(name)
            .await
            .map_err(|e| ClusterError::from(e).for_object(KIND_JOB, name))
    }

    async fn create_job(&self, job: &Job) -> Result<Job, ClusterError> {
        let namespace = job.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let name = job.metadata.name.as_deref().unwrap_or_default();
        debug!("POST job {}/{}", namespace, name);
        self.jobs(namespace)
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| ClusterError::from(e).for_object(KIND_JOB, name))
    }

    async fn delete_job(
        &self,
        namespace: &str,
        name: &str,
        propagation: Option<DeletePropagation>,
    ) -> Result<(), ClusterError> {
        debug!("DELETE job {}/{} propagation={:?}", namespace, name, propagation);
        self.jobs(namespace)
            .delete(name, &delete_params(propagation))
            .await
            .map_err(|e| ClusterError::from(e).for_object(KIND_JOB, name))?;
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, ClusterError> {
        debug!("LIST pods in {} selector={:?}", namespace, label_selector);
        let pods = self.pods(namespace).list(&list_params(label_selector)).await?;
        Ok(pods.items)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        debug!("DELETE pod {}/{}", namespace, name);
        self.pods(namespace)
            .delete(name, &delete_params(None))
            .await
            .map_err(|e| ClusterError::from(e).for_object(KIND_POD, name))?;
        Ok(())
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError> {
        debug!("LIST nodes selector={:?}", label_selector);
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes.list(&list_params(label_selector)).await?.items)
    }
}
