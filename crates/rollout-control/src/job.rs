//! Batch Job control.
//!
//! The pod template of a Job is immutable, so an update deletes the running
//! Job and creates it again. `JobControl` binds one Job to one cluster client
//! and exposes upsert, cascading delete and completion status.

use crate::config::RolloutConfig;
use crate::error::{convert_error, convert_error_with_context, ControlError};
use crate::meta::{
    clear_identity, format_meta, remove_controller_labels, ResourceDescriptor, DEFAULT_NAMESPACE,
    KIND_JOB,
};
use crate::pods::{collect_pods, PodSet};
use crate::resource::{delete_resource, upsert_resource, ResourceKind};
use crate::retry::{poll_status, StatusReporter};
use cluster_client::{ClusterClientTrait, DeletePropagation};
use k8s_openapi::api::batch::v1::Job;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument, Span};

/// Inputs for [`JobControl::new`]
#[derive(Clone)]
pub struct JobConfig {
    /// Desired job
    pub job: Job,
    /// Cluster client handle
    pub client: Option<Arc<dyn ClusterClientTrait>>,
    /// Retry and wait settings
    pub rollout: RolloutConfig,
}

impl JobConfig {
    /// Config for `job` with the default rollout settings
    pub fn new(job: Job, client: Arc<dyn ClusterClientTrait>) -> Self {
        Self {
            job,
            client: Some(client),
            rollout: RolloutConfig::default(),
        }
    }

    fn check_and_set_defaults(&mut self) -> Result<Arc<dyn ClusterClientTrait>, ControlError> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| ControlError::BadParameter("missing parameter client".to_string()))?;
        if self.job.metadata.name.as_deref().unwrap_or_default().is_empty() {
            return Err(ControlError::BadParameter("missing parameter job name".to_string()));
        }
        if self.job.metadata.namespace.as_deref().unwrap_or_default().is_empty() {
            self.job.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }
        Ok(client)
    }
}

/// Controller for one batch Job
pub struct JobControl {
    job: Job,
    client: Arc<dyn ClusterClientTrait>,
    rollout: RolloutConfig,
    descriptor: ResourceDescriptor,
    span: Span,
}

impl JobControl {
    /// Validate `config` and bind the controller to its job.
    ///
    /// Fails with `BadParameter` when the client or the job name is missing.
    pub fn new(mut config: JobConfig) -> Result<Self, ControlError> {
        let client = config.check_and_set_defaults()?;
        let descriptor = ResourceDescriptor::from_object(&config.job);
        let span = info_span!(
            "job_control",
            job = %descriptor,
            kind = %descriptor.kind,
            api_version = %descriptor.api_version
        );
        Ok(Self {
            job: config.job,
            client,
            rollout: config.rollout,
            descriptor,
            span,
        })
    }

    /// The desired job as supplied
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Create the job, replacing the current one if it exists
    pub async fn upsert(&self, cancel: &CancellationToken) -> Result<(), ControlError> {
        upsert_resource(cancel, self, &self.rollout.create_backoff)
            .instrument(self.span.clone())
            .await
    }

    /// Delete the job and wait for the deletion to complete.
    ///
    /// With `cascade`, pods created by the job are deleted as well.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        cascade: bool,
    ) -> Result<(), ControlError> {
        delete_resource(cancel, self, cascade, self.rollout.delete_wait)
            .instrument(self.span.clone())
            .await
    }

    /// Poll [`JobControl::status`] until the job completes
    pub async fn wait_complete(&self, cancel: &CancellationToken) -> Result<(), ControlError> {
        poll_status(cancel, self.rollout.status, self).await
    }

    /// `Ok(())` when the job is complete, `CompareFailed` while it is not
    pub async fn status(&self) -> Result<(), ControlError> {
        let job = self
            .client
            .get_job(&self.descriptor.namespace, &self.descriptor.name)
            .await
            .map_err(convert_error)?;

        if job_complete(&job) {
            return Ok(());
        }
        let (succeeded, active) = job_counts(&job);
        Err(ControlError::CompareFailed(format!(
            "job {} not yet complete (succeeded: {}, active: {})",
            format_meta(&job.metadata),
            succeeded,
            active
        )))
    }
}

/// Succeeded and active pod counts of a job
fn job_counts(job: &Job) -> (i32, i32) {
    let status = job.status.as_ref();
    (
        status.and_then(|s| s.succeeded).unwrap_or_default(),
        status.and_then(|s| s.active).unwrap_or_default(),
    )
}

/// Completion rule for a job.
///
/// Without `completions` the first successful pod ends the job once nothing
/// is active any more; otherwise `completions` pods must have succeeded.
pub fn job_complete(job: &Job) -> bool {
    let (succeeded, active) = job_counts(job);
    match job.spec.as_ref().and_then(|spec| spec.completions) {
        None => succeeded > 0 && active == 0,
        Some(completions) => succeeded >= completions,
    }
}

/// Copy of `job` that the API server will accept as a new object
fn prepare_for_create(job: &Job) -> Job {
    let mut job = job.clone();
    clear_identity(&mut job.metadata);
    if let Some(spec) = job.spec.as_mut() {
        if let Some(match_labels) = spec.selector.as_mut().and_then(|s| s.match_labels.as_mut()) {
            remove_controller_labels(match_labels);
        }
        if let Some(labels) = spec.template.metadata.as_mut().and_then(|m| m.labels.as_mut()) {
            remove_controller_labels(labels);
        }
    }
    job
}

#[async_trait::async_trait]
impl ResourceKind for JobControl {
    type Object = Job;

    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    fn span(&self) -> &Span {
        &self.span
    }

    fn client(&self) -> &dyn ClusterClientTrait {
        self.client.as_ref()
    }

    async fn fetch(&self) -> Result<Job, ControlError> {
        self.client
            .get_job(&self.descriptor.namespace, &self.descriptor.name)
            .await
            .map_err(convert_error)
    }

    async fn owned_pods(&self, current: &Job) -> Result<PodSet, ControlError> {
        let match_labels = current
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.as_ref())
            .and_then(|selector| selector.match_labels.as_ref());
        let uid = current.metadata.uid.clone();
        collect_pods(
            self.client.as_ref(),
            &self.descriptor.namespace,
            match_labels,
            &self.span,
            |reference| {
                uid.is_some() && reference.kind.as_deref() == Some(KIND_JOB) && reference.uid == uid
            },
        )
        .await
    }

    async fn delete_current(
        &self,
        propagation: Option<DeletePropagation>,
    ) -> Result<(), ControlError> {
        self.client
            .delete_job(&self.descriptor.namespace, &self.descriptor.name, propagation)
            .await
            .map_err(convert_error)
    }

    async fn create_desired(&self) -> Result<(), ControlError> {
        let job = prepare_for_create(&self.job);
        self.client
            .create_job(&job)
            .await
            .map(|_| ())
            .map_err(|e| {
                convert_error_with_context(e, Some(&format!("create job {}", self.descriptor)))
            })
    }

    async fn status(&self) -> Result<(), ControlError> {
        JobControl::status(self).await
    }
}

#[async_trait::async_trait]
impl StatusReporter for JobControl {
    async fn status(&self) -> Result<(), ControlError> {
        JobControl::status(self).await
    }

    fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffPolicy, RetryPolicy};
    use crate::error::ErrorKind;
    use cluster_client::mock::helpers::{job, labels, pod_on_node};
    use cluster_client::{MockCall, MockClusterClient, MockOp, StatusError};
    use k8s_openapi::api::batch::v1::{JobSpec, JobStatus};
    use k8s_openapi::api::core::v1::{Pod, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use std::time::Duration;

    const NS: &str = "default";
    const NAME: &str = "migrate";

    fn fast_rollout() -> RolloutConfig {
        RolloutConfig {
            status: RetryPolicy::new(5, Duration::from_millis(5)),
            delete_wait: RetryPolicy::new(10, Duration::from_millis(5)),
            create_backoff: BackoffPolicy {
                attempts: 5,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
            },
        }
    }

    /// Job as the server returns it: selector and template carry the controller uid
    fn server_job(uid: &str) -> Job {
        let selector_labels = labels(&[("app", NAME), ("controller-uid", uid)]);
        let mut job = job(NS, NAME);
        job.metadata.uid = Some(uid.to_string());
        job.metadata.resource_version = Some("17".to_string());
        job.metadata.self_link = Some(format!("/apis/batch/v1/namespaces/{}/jobs/{}", NS, NAME));
        job.spec = Some(JobSpec {
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels.clone()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels),
                    ..Default::default()
                }),
                spec: None,
            },
            ..Default::default()
        });
        job
    }

    fn control(mock: &MockClusterClient, desired: Job) -> JobControl {
        let mut config = JobConfig::new(desired, Arc::new(mock.clone()));
        config.rollout = fast_rollout();
        JobControl::new(config).unwrap()
    }

    fn job_with_status(completions: Option<i32>, succeeded: i32, active: i32) -> Job {
        let mut job = job(NS, NAME);
        job.spec = Some(JobSpec {
            completions,
            ..Default::default()
        });
        job.status = Some(JobStatus {
            succeeded: Some(succeeded),
            active: Some(active),
            ..Default::default()
        });
        job
    }

    /// Pod created by the job instance with `owner_uid`, labelled like its pods
    fn owned_pod(name: &str, node: &str, owner_uid: &str) -> Pod {
        let pod_labels = [("app", NAME), ("controller-uid", owner_uid)];
        pod_on_node(NS, name, node, &pod_labels, Some(("Job", owner_uid)))
    }

    fn get_calls(mock: &MockClusterClient) -> usize {
        mock.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::GetJob { .. }))
            .count()
    }

    fn delete_calls(mock: &MockClusterClient) -> usize {
        mock.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::DeleteJob { .. }))
            .count()
    }

    #[test]
    fn test_new_requires_client() {
        let config = JobConfig {
            job: job(NS, NAME),
            client: None,
            rollout: RolloutConfig::default(),
        };
        let err = JobControl::new(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }

    #[test]
    fn test_new_defaults_namespace() {
        let mock = MockClusterClient::new();
        let mut desired = job(NS, NAME);
        desired.metadata.namespace = None;
        let control = control(&mock, desired);
        assert_eq!(control.descriptor().namespace, DEFAULT_NAMESPACE);
        assert_eq!(control.descriptor().kind, KIND_JOB);
        assert_eq!(control.descriptor().api_version, "batch/v1");
    }

    #[test]
    fn test_prepare_for_create_strips_identity_and_controller_labels() {
        let prepared = prepare_for_create(&server_job("uid-1"));
        assert!(prepared.metadata.uid.is_none());
        assert!(prepared.metadata.resource_version.is_none());
        assert!(prepared.metadata.self_link.is_none());

        let spec = prepared.spec.unwrap();
        let match_labels = spec.selector.unwrap().match_labels.unwrap();
        assert_eq!(match_labels, labels(&[("app", NAME)]));
        let template_labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(template_labels, labels(&[("app", NAME)]));
    }

    #[tokio::test]
    async fn test_upsert_creates_absent_job() {
        let mock = MockClusterClient::new();
        let control = control(&mock, server_job("stale-uid"));

        control.upsert(&CancellationToken::new()).await.unwrap();

        assert_eq!(delete_calls(&mock), 0);
        let created = mock.created_jobs();
        assert_eq!(created.len(), 1);
        assert!(created[0].metadata.uid.is_none());
        assert!(created[0].metadata.resource_version.is_none());
        assert!(mock.job(NS, NAME).is_some());
    }

    #[tokio::test]
    async fn test_upsert_replaces_job_and_deletes_old_pods() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.add_pod(owned_pod("migrate-old", "node-1", "old-uid"));
        // same labels, created by a different job instance
        let mut unrelated = owned_pod("migrate-unrelated", "node-2", "other-uid");
        unrelated.metadata.labels = Some(labels(&[("app", NAME), ("controller-uid", "old-uid")]));
        mock.add_pod(unrelated);
        let control = control(&mock, existing);

        control.upsert(&CancellationToken::new()).await.unwrap();

        let calls = mock.calls();
        let position = |matcher: fn(&MockCall) -> bool| calls.iter().position(matcher).unwrap();
        let delete_job_at = position(|c| matches!(c, MockCall::DeleteJob { .. }));
        let create_at = position(|c| matches!(c, MockCall::CreateJob { .. }));
        let delete_pod_at = position(|c| matches!(c, MockCall::DeletePod { .. }));
        assert!(delete_job_at < create_at && create_at < delete_pod_at);

        let created = &mock.created_jobs()[0];
        let spec = created.spec.as_ref().unwrap();
        assert_eq!(spec.selector.as_ref().unwrap().match_labels, Some(labels(&[("app", NAME)])));

        assert_eq!(mock.deleted_pods(), vec!["migrate-old"]);
        assert!(mock.pod(NS, "migrate-unrelated").is_some());
        let replaced = mock.job(NS, NAME).unwrap();
        assert_ne!(replaced.metadata.uid.as_deref(), Some("old-uid"));
    }

    #[tokio::test]
    async fn test_upsert_rides_out_slow_deletion() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.set_deletion_lag(2);
        let control = control(&mock, existing);

        control.upsert(&CancellationToken::new()).await.unwrap();

        assert_eq!(mock.created_jobs().len(), 3);
        assert!(mock.job(NS, NAME).is_some());
    }

    #[tokio::test]
    async fn test_upsert_zero_create_attempts_still_creates() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        let mut config = JobConfig::new(existing, Arc::new(mock.clone()));
        config.rollout = RolloutConfig::from_lookup(|name| {
            (name == "ROLLOUT_CREATE_BACKOFF_ATTEMPTS").then(|| "0".to_string())
        })
        .unwrap();
        let control = JobControl::new(config).unwrap();

        control.upsert(&CancellationToken::new()).await.unwrap();

        assert_eq!(mock.created_jobs().len(), 1);
        let replaced = mock.job(NS, NAME).unwrap();
        assert_ne!(replaced.metadata.uid.as_deref(), Some("old-uid"));
    }

    #[tokio::test]
    async fn test_upsert_surfaces_fetch_errors() {
        let mock = MockClusterClient::new();
        mock.fail_next(MockOp::GetJob, StatusError::forbidden("Job", NAME));
        let control = control(&mock, job(NS, NAME));

        let err = control.upsert(&CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert!(mock.created_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_does_not_retry_delete() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.fail_next(MockOp::DeleteJob, StatusError::internal("etcd timeout"));
        let control = control(&mock, existing);

        let err = control.upsert(&CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(delete_calls(&mock), 1);
        assert!(mock.created_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_job_is_not_found() {
        let mock = MockClusterClient::new();
        let control = control(&mock, job(NS, NAME));

        let err = control.delete(&CancellationToken::new(), true).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(delete_calls(&mock), 0);
    }

    #[tokio::test]
    async fn test_delete_waits_for_propagation_then_deletes_pods() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.add_pod(owned_pod("migrate-old", "node-1", "old-uid"));
        mock.set_deletion_lag(3);
        let control = control(&mock, existing);

        control.delete(&CancellationToken::new(), true).await.unwrap();

        let calls = mock.calls();
        assert!(calls.contains(&MockCall::DeleteJob {
            namespace: NS.to_string(),
            name: NAME.to_string(),
            propagation: Some(DeletePropagation::Foreground),
        }));
        let gets = get_calls(&mock);
        // initial fetch, three reads while terminating, one NotFound
        assert_eq!(gets, 5);
        assert_eq!(calls.last(), Some(&MockCall::DeletePod {
            namespace: NS.to_string(),
            name: "migrate-old".to_string(),
        }));
        assert!(mock.job(NS, NAME).is_none());
    }

    #[tokio::test]
    async fn test_delete_zero_wait_attempts_still_waits() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.add_pod(owned_pod("migrate-old", "node-1", "old-uid"));
        mock.set_deletion_lag(3);
        let mut config = JobConfig::new(existing, Arc::new(mock.clone()));
        config.rollout = RolloutConfig {
            delete_wait: RetryPolicy::new(0, Duration::from_millis(5)),
            ..fast_rollout()
        };
        let control = JobControl::new(config).unwrap();

        control.delete(&CancellationToken::new(), true).await.unwrap();

        assert_eq!(get_calls(&mock), 5);
        assert!(mock.job(NS, NAME).is_none());
        assert_eq!(mock.deleted_pods(), vec!["migrate-old"]);
    }

    #[tokio::test]
    async fn test_delete_without_cascade_leaves_pods() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.add_pod(owned_pod("migrate-old", "node-1", "old-uid"));
        let control = control(&mock, existing);

        control.delete(&CancellationToken::new(), false).await.unwrap();

        assert!(mock.deleted_pods().is_empty());
        assert!(mock.pod(NS, "migrate-old").is_some());
    }

    #[tokio::test]
    async fn test_delete_gives_up_when_job_lingers() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.add_pod(owned_pod("migrate-old", "node-1", "old-uid"));
        mock.set_deletion_lag(100);
        let control = control(&mock, existing);

        let err = control.delete(&CancellationToken::new(), true).await.unwrap_err();

        assert!(err.is_compare_failed());
        assert!(mock.deleted_pods().is_empty());
    }

    #[tokio::test]
    async fn test_delete_wait_aborts_on_fetch_fault() {
        let mock = MockClusterClient::new();
        let existing = mock.add_job(server_job("old-uid"));
        mock.set_deletion_lag(100);
        mock.allow_next(MockOp::GetJob);
        mock.fail_next(MockOp::GetJob, StatusError::forbidden("Job", NAME));
        let control = control(&mock, existing);

        let err = control.delete(&CancellationToken::new(), true).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        let gets = get_calls(&mock);
        assert_eq!(gets, 2);
    }

    #[test]
    fn test_completion_rules() {
        assert!(job_complete(&job_with_status(None, 1, 0)));
        assert!(!job_complete(&job_with_status(None, 0, 1)));
        assert!(!job_complete(&job_with_status(None, 1, 1)));
        assert!(job_complete(&job_with_status(Some(3), 3, 0)));
        assert!(!job_complete(&job_with_status(Some(3), 2, 1)));
    }

    #[tokio::test]
    async fn test_status_reports_counts_while_incomplete() {
        let mock = MockClusterClient::new();
        mock.add_job(job_with_status(Some(3), 2, 1));
        let control = control(&mock, job(NS, NAME));

        let err = control.status().await.unwrap_err();

        assert!(err.is_compare_failed());
        assert!(
            err.to_string()
                .contains("job default/migrate not yet complete (succeeded: 2, active: 1)")
        );
    }

    #[tokio::test]
    async fn test_status_complete() {
        let mock = MockClusterClient::new();
        mock.add_job(job_with_status(None, 1, 0));
        let control = control(&mock, job(NS, NAME));

        assert!(control.status().await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_status_until_complete() {
        let mock = MockClusterClient::new();
        mock.add_job(job_with_status(None, 1, 0));
        mock.fail_next(MockOp::GetJob, StatusError::internal("apiserver restarting"));
        let control = control(&mock, job(NS, NAME));

        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        poll_status(&CancellationToken::new(), policy, &control).await.unwrap();

        let gets = get_calls(&mock);
        assert_eq!(gets, 2);
    }

    #[tokio::test]
    async fn test_wait_complete_gives_up_on_running_job() {
        let mock = MockClusterClient::new();
        mock.add_job(job_with_status(Some(2), 1, 1));
        let control = control(&mock, job(NS, NAME));

        let err = control.wait_complete(&CancellationToken::new()).await.unwrap_err();

        assert!(err.is_compare_failed());
        let gets = get_calls(&mock);
        assert_eq!(gets, 5);
    }
}
