//! Bounded retry and polling primitives.
//!
//! All loops here are sequential: the operation is never run concurrently
//! with anything, and cancellation is only observed while waiting between
//! attempts. An in-flight call is always allowed to finish.
//!
//! On exhaustion the error of the last attempt is returned as is.

use crate::backoff::ExponentialBackoff;
use crate::config::{BackoffPolicy, RetryPolicy, DEFAULT_DELETE_WAIT};
use crate::error::ControlError;
use std::fmt::Display;
use std::future::Future;
use std::iter;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument, Span};

/// Something whose status can be polled until it reports success
#[async_trait::async_trait]
pub trait StatusReporter: Send + Sync {
    /// `Ok(())` once the resource reached its desired state
    async fn status(&self) -> Result<(), ControlError>;

    /// Span the reporter logs in
    fn span(&self) -> &Span;
}

/// Call `f` up to `attempts` times, waiting `period` between failed calls.
///
/// Zero attempts is a no-op that succeeds without calling `f`.
pub async fn retry<F, Fut, E>(
    cancel: &CancellationToken,
    attempts: u32,
    period: Duration,
    f: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    retry_with_delays(cancel, attempts, iter::repeat(period), f, |_| true).await
}

/// Like [`retry`] but with delays growing per `policy`
pub async fn retry_with_backoff<F, Fut, E>(
    cancel: &CancellationToken,
    policy: &BackoffPolicy,
    f: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let delays = ExponentialBackoff::from_policy(policy);
    retry_with_delays(cancel, policy.attempts, delays, f, |_| true).await
}

/// Poll `reporter` until its status succeeds.
///
/// Zero fields in `policy` fall back to the defaults.
pub async fn poll_status<R>(
    cancel: &CancellationToken,
    policy: RetryPolicy,
    reporter: &R,
) -> Result<(), ControlError>
where
    R: StatusReporter + ?Sized,
{
    let policy = policy.with_defaults(RetryPolicy::default());
    let span = reporter.span().clone();
    info!(
        parent: &span,
        "checking status retry_attempts={}, retry_period={:?}", policy.attempts, policy.period
    );
    retry(cancel, policy.attempts, policy.period, || reporter.status())
        .instrument(span)
        .await
}

/// Wait at a fixed interval until `condition` succeeds.
///
/// `condition` signals "not yet" with [`ControlError::CompareFailed`]; any
/// other error aborts the wait immediately. Zero fields in `policy` fall back
/// to [`DEFAULT_DELETE_WAIT`], so `condition` is always checked.
pub async fn wait_for_condition<F, Fut>(
    cancel: &CancellationToken,
    policy: RetryPolicy,
    condition: F,
) -> Result<(), ControlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ControlError>>,
{
    let policy = policy.with_defaults(DEFAULT_DELETE_WAIT);
    retry_with_delays(
        cancel,
        policy.attempts,
        iter::repeat(policy.period),
        condition,
        ControlError::is_compare_failed,
    )
    .await
}

/// Run a create call under exponential backoff.
///
/// Used right after deleting an object: the server may still hold the old
/// generation and reject the create for a while. Zero or unusable fields in
/// `policy` fall back to the defaults, so the create is always attempted.
pub async fn backoff_create<F, Fut>(
    cancel: &CancellationToken,
    policy: &BackoffPolicy,
    create: F,
) -> Result<(), ControlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ControlError>>,
{
    let policy = policy.with_defaults(BackoffPolicy::default());
    retry_with_backoff(cancel, &policy, create).await
}

/// Run `f`; if it fails, run `recover` before returning the original error.
///
/// The outcome of `recover` is only logged.
pub async fn with_recover<F, Fut, R, RFut, E>(f: F, recover: R) -> Result<(), E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    R: FnOnce() -> RFut,
    RFut: Future<Output = Result<(), E>>,
    E: Display,
{
    let err = match f().await {
        Ok(()) => {
            debug!("no recovery needed, returning");
            return Ok(());
        }
        Err(err) => err,
    };

    info!("need to recover after: {}", err);
    match recover().await {
        Ok(()) => info!("recovered successfully"),
        Err(recover_err) => error!("recovery failed: {}", recover_err),
    }
    Err(err)
}

async fn retry_with_delays<F, Fut, E, D, P>(
    cancel: &CancellationToken,
    attempts: u32,
    mut delays: D,
    mut f: F,
    retryable: P,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
    D: Iterator<Item = Duration>,
    P: Fn(&E) -> bool,
{
    if attempts == 0 {
        return Ok(());
    }

    let mut result = f().await;
    let mut attempt = 1;
    while attempt < attempts {
        let Err(err) = &result else {
            break;
        };
        if !retryable(err) {
            break;
        }

        let delay = delays.next().unwrap_or_default();
        info!("attempt {}, result: {}, retry in {:?}", attempt + 1, err, delay);
        tokio::select! {
            () = cancel.cancelled() => {
                info!("context is closing, return");
                return result;
            }
            () = tokio::time::sleep(delay) => {}
        }

        result = f().await;
        attempt += 1;
    }
    result
}
