//! Delete-then-recreate orchestration for workloads with immutable specs.
//!
//! A workload kind implements [`ResourceKind`]; [`upsert_resource`] and
//! [`delete_resource`] drive the remote calls for any such kind. Both run
//! strictly sequentially and perform no rollback: if a replace fails after
//! the old object was deleted, the object stays absent until the next upsert.

use crate::config::{BackoffPolicy, RetryPolicy};
use crate::error::ControlError;
use crate::meta::ResourceDescriptor;
use crate::pods::{delete_pods, PodSet};
use crate::retry::{backoff_create, wait_for_condition};
use cluster_client::{ClusterClientTrait, DeletePropagation};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Span};

/// Capabilities a workload kind provides to the orchestration
#[async_trait::async_trait]
pub trait ResourceKind: Send + Sync {
    /// Remote object type
    type Object: Send + Sync;

    /// Identity of the desired object
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Span all logging for this resource goes to
    fn span(&self) -> &Span;

    /// Cluster client the object lives behind
    fn client(&self) -> &dyn ClusterClientTrait;

    /// Fetch the current object by name
    async fn fetch(&self) -> Result<Self::Object, ControlError>;

    /// Pods created by exactly this object instance
    async fn owned_pods(&self, current: &Self::Object) -> Result<PodSet, ControlError>;

    /// Delete the current object by name
    async fn delete_current(
        &self,
        propagation: Option<DeletePropagation>,
    ) -> Result<(), ControlError>;

    /// Create the desired object with its server-assigned identity removed
    async fn create_desired(&self) -> Result<(), ControlError>;

    /// `Ok(())` once the workload reached its desired state
    async fn status(&self) -> Result<(), ControlError>;
}

/// Create `resource`, replacing the current object if there is one.
///
/// Pods of the replaced object are deleted after the new object exists.
pub async fn upsert_resource<R>(
    cancel: &CancellationToken,
    resource: &R,
    create_backoff: &BackoffPolicy,
) -> Result<(), ControlError>
where
    R: ResourceKind + ?Sized,
{
    let descriptor = resource.descriptor();
    info!("upsert {}", descriptor);

    let current = match resource.fetch().await {
        Ok(current) => Some(current),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    let stale_pods = match &current {
        Some(current) => {
            let pods = resource.owned_pods(current).await?;
            info!("deleting current {}", descriptor.kind.to_lowercase());
            resource.delete_current(None).await?;
            Some(pods)
        }
        None => None,
    };

    info!("creating new {}", descriptor.kind.to_lowercase());
    backoff_create(cancel, create_backoff, || resource.create_desired()).await?;
    info!("{} created successfully", descriptor.kind.to_lowercase());

    if let Some(pods) = stale_pods {
        info!("deleting pods created by previous {}", descriptor.kind.to_lowercase());
        delete_pods(resource.client(), &descriptor.namespace, &pods, resource.span()).await?;
    }
    Ok(())
}

/// Delete `resource` with foreground propagation and wait until it is gone.
///
/// With `cascade`, pods owned by the deleted object are removed afterwards.
pub async fn delete_resource<R>(
    cancel: &CancellationToken,
    resource: &R,
    cascade: bool,
    wait: RetryPolicy,
) -> Result<(), ControlError>
where
    R: ResourceKind + ?Sized,
{
    let descriptor = resource.descriptor();
    info!("delete {}", descriptor);

    let current = resource.fetch().await?;
    let pods = if cascade {
        resource.owned_pods(&current).await?
    } else {
        debug!("cascade not set, pods are left to the server");
        PodSet::new()
    };

    info!("deleting current {}", descriptor.kind.to_lowercase());
    resource.delete_current(Some(DeletePropagation::Foreground)).await?;

    wait_for_condition(cancel, wait, || async {
        match resource.fetch().await {
            Ok(_) => Err(ControlError::CompareFailed(format!(
                "{} {} is still present",
                descriptor.kind, descriptor
            ))),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    })
    .await?;

    if !pods.is_empty() {
        info!("deleting pods");
        delete_pods(resource.client(), &descriptor.namespace, &pods, resource.span()).await?;
    }
    Ok(())
}
