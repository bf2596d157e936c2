//! Controller error taxonomy.
//!
//! Remote failures are translated once, where the call is made, into a small
//! set of kinds callers can branch on. `CompareFailed` is not a fault: it
//! means "not there yet" and is what pollers retry on.

use cluster_client::error::REASON_ALREADY_EXISTS;
use cluster_client::ClusterError;
use thiserror::Error;

/// Stable classification of a [`ControlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Object does not exist
    NotFound,
    /// Object with the same name exists
    AlreadyExists,
    /// Caller lacks permission
    AccessDenied,
    /// Caller supplied invalid input
    BadParameter,
    /// Precondition not satisfied yet; pollers retry on this
    CompareFailed,
    /// Anything else
    Unknown,
}

/// Errors returned by rollout controllers.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Object is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create raced with an existing object
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Authorization failure
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Invalid local configuration
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// Precondition not met yet
    #[error("Compare failed: {0}")]
    CompareFailed(String),

    /// Unrecognized remote error, passed through untouched
    #[error(transparent)]
    Cluster(ClusterError),
}

impl ControlError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::NotFound(_) => ErrorKind::NotFound,
            ControlError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ControlError::AccessDenied(_) => ErrorKind::AccessDenied,
            ControlError::BadParameter(_) => ErrorKind::BadParameter,
            ControlError::CompareFailed(_) => ErrorKind::CompareFailed,
            ControlError::Cluster(_) => ErrorKind::Unknown,
        }
    }

    /// True for [`ErrorKind::NotFound`]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for [`ErrorKind::CompareFailed`]
    pub fn is_compare_failed(&self) -> bool {
        self.kind() == ErrorKind::CompareFailed
    }
}

impl From<ClusterError> for ControlError {
    fn from(err: ClusterError) -> Self {
        convert_error(err)
    }
}

/// Translate a cluster error into the local taxonomy
pub fn convert_error(err: ClusterError) -> ControlError {
    convert_error_with_context(err, None)
}

/// Translate a cluster error, prefixing the message with `context`.
///
/// Errors that are not API status errors are returned unchanged, as are
/// status codes without a local counterpart.
pub fn convert_error_with_context(err: ClusterError, context: Option<&str>) -> ControlError {
    let Some(status) = err.status().cloned() else {
        return ControlError::Cluster(err);
    };

    let mut message = err.to_string();
    if let Some(details) = status.details.as_ref().filter(|d| !d.is_empty()) {
        message = format!("{}, details: {}", message, details);
    }
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        message = format!("{}: {}", context, message);
    }

    match status.code {
        409 if status.reason == REASON_ALREADY_EXISTS => ControlError::AlreadyExists(message),
        404 => ControlError::NotFound(message),
        403 => ControlError::AccessDenied(message),
        _ => ControlError::Cluster(err),
    }
}
