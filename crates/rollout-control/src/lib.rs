//! Rollout control for immutable Kubernetes workloads
//!
//! Workloads whose pod template cannot be updated in place are rolled out by
//! deleting the running object and creating the desired one again. This crate
//! drives that sequence against a [`cluster_client::ClusterClientTrait`]:
//!
//! - [`job::JobControl`] upserts, deletes and reports completion of a batch Job
//! - [`pods`] finds the pods created by one exact object instance
//! - [`readiness`] evaluates per-node pods of node-exclusive workloads
//! - [`retry`] holds the bounded, cancellable retry loops everything waits in
//! - [`error`] maps API status errors onto a small [`ErrorKind`] taxonomy
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cluster_client::KubeClusterClient;
//! use k8s_openapi::api::batch::v1::Job;
//! use rollout_control::{JobConfig, JobControl, RolloutConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(desired: Job) -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(KubeClusterClient::try_default().await?);
//! let mut config = JobConfig::new(desired, client);
//! config.rollout = RolloutConfig::from_env()?;
//!
//! let control = JobControl::new(config)?;
//! let cancel = CancellationToken::new();
//! control.upsert(&cancel).await?;
//! control.wait_complete(&cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod job;
pub mod meta;
pub mod pods;
pub mod readiness;
pub mod resource;
pub mod retry;

pub use config::{BackoffPolicy, RetryPolicy, RolloutConfig};
pub use error::{convert_error, convert_error_with_context, ControlError, ErrorKind};
pub use job::{job_complete, JobConfig, JobControl};
pub use meta::ResourceDescriptor;
pub use pods::PodSet;
pub use readiness::PodReadiness;
pub use resource::{delete_resource, upsert_resource, ResourceKind};
pub use retry::{poll_status, retry, StatusReporter};
