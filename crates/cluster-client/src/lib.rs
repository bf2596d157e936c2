//! Kubernetes Cluster Client
//!
//! The narrow slice of the Kubernetes API that rollout controllers consume:
//! batch Jobs, the Pods they own, and Nodes. Everything is behind
//! [`ClusterClientTrait`] so controllers can be unit tested against an
//! in-memory cluster.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, DeletePropagation, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//!
//! let job = client.get_job("default", "migrate-db").await?;
//! println!("job uid: {:?}", job.metadata.uid);
//!
//! client
//!     .delete_job("default", "migrate-db", Some(DeletePropagation::Foreground))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Status errors**: API failures surface as [`StatusError`] with the HTTP code,
//!   reason and structured details the API server returned
//! - **Provenance**: [`SerializedReference`] models the `kubernetes.io/created-by`
//!   pod annotation
//! - **Mocking**: `MockClusterClient` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::{ClusterError, StatusCause, StatusDetails, StatusError};
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockCall, MockClusterClient, MockOp};
