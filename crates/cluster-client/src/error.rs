//! Cluster client errors

use std::fmt;
use thiserror::Error;

/// Reason the API server reports when a create collides with an existing object.
pub const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// Errors that can occur when talking to the cluster API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The API server answered with a status error
    #[error("{0}")]
    Status(#[from] StatusError),

    /// Transport, TLS, auth or any other client-side failure
    #[error("Kubernetes client error: {0}")]
    Kube(kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Returns the status error if the API server produced one
    pub fn status(&self) -> Option<&StatusError> {
        match self {
            ClusterError::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Attach the object a request was about to a status error without details.
    ///
    /// Status errors that already carry details and non-status errors are
    /// returned unchanged.
    #[must_use]
    pub fn for_object(self, kind: &str, name: &str) -> Self {
        match self {
            ClusterError::Status(status) if status.details.is_none() => {
                ClusterError::Status(status.with_details(StatusDetails::for_object(kind, name)))
            }
            other => other,
        }
    }
}

/// Converts kube errors, keeping API status responses as [`StatusError`].
///
/// kube only hands back the code, reason and message of a status response;
/// its `details` are lost here. [`ClusterError::for_object`] restores the
/// object identity at the call site.
impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => ClusterError::Status(StatusError::new(
                response.code,
                &response.reason,
                &response.message,
            )),
            other => ClusterError::Kube(other),
        }
    }
}

/// Status error returned by the API server.
///
/// Mirrors the `Status` object of the Kubernetes API: an HTTP code, a
/// machine-readable reason and optional structured details.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StatusError {
    /// HTTP status code
    pub code: u16,
    /// Machine-readable reason, e.g. `AlreadyExists`
    pub reason: String,
    /// Human-readable description
    pub message: String,
    /// Object the error is about, when known
    pub details: Option<StatusDetails>,
}

impl StatusError {
    /// Status error without details
    pub fn new(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Replace the details
    #[must_use]
    pub fn with_details(mut self, details: StatusDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// 404 for `kind` named `name`
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::new(
            404,
            "NotFound",
            format!("{}s \"{}\" not found", kind.to_lowercase(), name),
        )
        .with_details(StatusDetails::for_object(kind, name))
    }

    /// 409 AlreadyExists for `kind` named `name`
    pub fn already_exists(kind: &str, name: &str) -> Self {
        Self::new(
            409,
            REASON_ALREADY_EXISTS,
            format!("{}s \"{}\" already exists", kind.to_lowercase(), name),
        )
        .with_details(StatusDetails::for_object(kind, name))
    }

    /// 403 for `kind` named `name`
    pub fn forbidden(kind: &str, name: &str) -> Self {
        Self::new(
            403,
            "Forbidden",
            format!("{}s \"{}\" is forbidden", kind.to_lowercase(), name),
        )
    }

    /// 500 with a free-form message
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "InternalError", message)
    }
}

/// Structured details attached to a status error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusDetails {
    /// Object name
    pub name: String,
    /// API group, empty for the core group
    pub group: String,
    /// Lowercased kind
    pub kind: String,
    /// Field-level causes
    pub causes: Vec<StatusCause>,
}

impl StatusDetails {
    fn for_object(kind: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_lowercase(),
            ..Default::default()
        }
    }

    /// True when none of name, group, kind or causes carry information
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.group.is_empty()
            && self.kind.is_empty()
            && self.causes.is_empty()
    }
}

impl fmt::Display for StatusDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.name.is_empty() {
            parts.push(format!("name={}", self.name));
        }
        if !self.group.is_empty() {
            parts.push(format!("group={}", self.group));
        }
        if !self.kind.is_empty() {
            parts.push(format!("kind={}", self.kind));
        }
        if !self.causes.is_empty() {
            let causes: Vec<String> = self.causes.iter().map(ToString::to_string).collect();
            parts.push(format!("causes=[{}]", causes.join("; ")));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// One cause inside [`StatusDetails`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCause {
    /// Machine-readable cause, e.g. `FieldValueInvalid`
    pub reason: String,
    /// Human-readable description
    pub message: String,
    /// JSON path of the offending field
    pub field: String,
}

impl fmt::Display for StatusCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}: {}", self.reason, self.message)
        } else {
            write!(f, "{}: {} ({})", self.reason, self.message, self.field)
        }
    }
}
