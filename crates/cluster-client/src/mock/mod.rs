//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! that behaves enough like an API server to exercise controllers without a
//! cluster:
//! - creates assign a fresh UID and resource version and reject duplicates
//!   with 409 AlreadyExists
//! - deletes can be made eventually consistent with [`MockClusterClient::set_deletion_lag`]
//! - failures can be scripted per operation with [`MockClusterClient::fail_next`]
//! - every call is recorded for assertions
//!
//! `helpers.rs` holds builders for the objects tests usually need.

pub mod helpers;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::{ClusterError, StatusError};
use crate::models::DeletePropagation;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

type ObjectKey = (String, String);

/// Operations that can have failures scripted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    GetJob,
    CreateJob,
    DeleteJob,
    ListPods,
    DeletePod,
    ListNodes,
}

/// A recorded call against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetJob { namespace: String, name: String },
    CreateJob { namespace: String, name: String },
    DeleteJob { namespace: String, name: String, propagation: Option<DeletePropagation> },
    ListPods { namespace: String, label_selector: String },
    DeletePod { namespace: String, name: String },
    ListNodes { label_selector: String },
}

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pub(crate) jobs: Arc<Mutex<BTreeMap<ObjectKey, Job>>>,
    pub(crate) pods: Arc<Mutex<BTreeMap<ObjectKey, Pod>>>,
    pub(crate) nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    // Deleted jobs that stay visible for the remaining number of reads
    pub(crate) terminating: Arc<Mutex<HashMap<ObjectKey, u32>>>,
    pub(crate) deletion_lag: Arc<Mutex<u32>>,
    // `None` entries let one call through before the next scripted failure
    pub(crate) scripted: Arc<Mutex<HashMap<MockOp, VecDeque<Option<StatusError>>>>>,
    pub(crate) calls: Arc<Mutex<Vec<MockCall>>>,
    pub(crate) created_jobs: Arc<Mutex<Vec<Job>>>,
    pub(crate) next_version: Arc<Mutex<u64>>,
}

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job to the mock store (for test setup)
    ///
    /// Assigns a UID and resource version when the job has none and returns
    /// the stored object.
    pub fn add_job(&self, mut job: Job) -> Job {
        let namespace = job.metadata.namespace.clone().unwrap_or_default();
        let name = job.metadata.name.clone().unwrap_or_default();
        if job.metadata.uid.is_none() {
            job.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        job.metadata.resource_version = Some(self.next_version());
        self.jobs.lock().unwrap().insert(key(&namespace, &name), job.clone());
        job
    }

    /// Add a pod to the mock store (for test setup)
    pub fn add_pod(&self, pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.lock().unwrap().insert(key(&namespace, &name), pod);
    }

    /// Add a node to the mock store (for test setup)
    pub fn add_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.lock().unwrap().insert(name, node);
    }

    /// Number of reads (gets or creates) a deleted job stays visible for
    pub fn set_deletion_lag(&self, reads: u32) {
        *self.deletion_lag.lock().unwrap() = reads;
    }

    /// Fail the next call of `op` with `err`
    pub fn fail_next(&self, op: MockOp, err: StatusError) {
        self.scripted.lock().unwrap().entry(op).or_default().push_back(Some(err));
    }

    /// Let the next call of `op` through before any scripted failure
    pub fn allow_next(&self, op: MockOp) {
        self.scripted.lock().unwrap().entry(op).or_default().push_back(None);
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Jobs exactly as they were submitted to `create_job`
    pub fn created_jobs(&self) -> Vec<Job> {
        self.created_jobs.lock().unwrap().clone()
    }

    /// Current job, ignoring deletion lag
    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Current pod
    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Names of pods deleted so far, in order
    pub fn deleted_pods(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::DeletePod { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn scripted_failure(&self, op: MockOp) -> Result<(), ClusterError> {
        let next = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Some(err)) => Err(ClusterError::Status(err)),
            _ => Ok(()),
        }
    }

    fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    /// Advance a terminating job by one read. Returns true while it is still visible.
    fn still_terminating(&self, object: &ObjectKey) -> bool {
        let mut terminating = self.terminating.lock().unwrap();
        match terminating.get_mut(object) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            Some(_) => {
                terminating.remove(object);
                self.jobs.lock().unwrap().remove(object);
                false
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, ClusterError> {
        self.record(MockCall::GetJob {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        self.scripted_failure(MockOp::GetJob)?;
        let object = key(namespace, name);
        self.still_terminating(&object);
        self.jobs
            .lock()
            .unwrap()
            .get(&object)
            .cloned()
            .ok_or_else(|| StatusError::not_found("Job", name).into())
    }

    async fn create_job(&self, job: &Job) -> Result<Job, ClusterError> {
        let namespace = job.metadata.namespace.clone().unwrap_or_default();
        let name = job.metadata.name.clone().unwrap_or_default();
        self.record(MockCall::CreateJob {
            namespace: namespace.clone(),
            name: name.clone(),
        });
        self.scripted_failure(MockOp::CreateJob)?;
        self.created_jobs.lock().unwrap().push(job.clone());

        let object = key(&namespace, &name);
        self.still_terminating(&object);
        if self.jobs.lock().unwrap().contains_key(&object) {
            return Err(StatusError::already_exists("Job", &name).into());
        }
        if job.metadata.uid.is_some() || job.metadata.resource_version.is_some() {
            return Err(StatusError::new(
                400,
                "BadRequest",
                "resourceVersion and uid should not be set on objects to be created",
            )
            .into());
        }
        Ok(self.add_job(job.clone()))
    }

    async fn delete_job(
        &self,
        namespace: &str,
        name: &str,
        propagation: Option<DeletePropagation>,
    ) -> Result<(), ClusterError> {
        self.record(MockCall::DeleteJob {
            namespace: namespace.to_string(),
            name: name.to_string(),
            propagation,
        });
        self.scripted_failure(MockOp::DeleteJob)?;
        let object = key(namespace, name);
        if self.terminating.lock().unwrap().contains_key(&object)
            || !self.jobs.lock().unwrap().contains_key(&object)
        {
            return Err(StatusError::not_found("Job", name).into());
        }
        let lag = *self.deletion_lag.lock().unwrap();
        if lag > 0 {
            self.terminating.lock().unwrap().insert(object, lag);
        } else {
            self.jobs.lock().unwrap().remove(&object);
        }
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, ClusterError> {
        self.record(MockCall::ListPods {
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
        });
        self.scripted_failure(MockOp::ListPods)?;
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), pod)| {
                ns == namespace
                    && helpers::selector_matches(label_selector, pod.metadata.labels.as_ref())
            })
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.record(MockCall::DeletePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        self.scripted_failure(MockOp::DeletePod)?;
        self.pods
            .lock()
            .unwrap()
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StatusError::not_found("Pod", name).into())
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError> {
        self.record(MockCall::ListNodes {
            label_selector: label_selector.to_string(),
        });
        self.scripted_failure(MockOp::ListNodes)?;
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|node| helpers::selector_matches(label_selector, node.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }
}
