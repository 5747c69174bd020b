//! Central error types for the machine health operator
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Central error type for the machine health operator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Operator configuration or process setup error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The policy's label selector cannot be turned into a valid selector
    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    /// An unhealthy condition carries a timeout that is not a valid duration
    #[error("Invalid timeout {timeout:?} for condition {condition_type}: {reason}")]
    InvalidTimeout {
        condition_type: String,
        timeout: String,
        reason: String,
    },

    /// A node's machine back-reference annotation is malformed
    #[error("Invalid machine reference: {0}")]
    InvalidMachineReference(String),

    /// Resource not found in the cluster
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Optimistic concurrency conflict on update/delete
    #[error("Conflict writing {kind}/{name}: object was modified")]
    Conflict { kind: String, name: String },

    /// Remediation action failed
    #[error("Remediation failed: {0}")]
    RemediationError(String),

    /// Metrics could not be encoded
    #[error("Metrics error: {0}")]
    MetricsError(String),
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Check if this error type should trigger a quick retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::Conflict { .. } | Error::RemediationError(_)
        )
    }

    /// Errors that only a policy author can fix
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSelector(_) | Error::InvalidTimeout { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Convert to a human-readable message for logs and API responses
    pub fn status_message(&self) -> String {
        match self {
            Error::KubeError(e) => format!("Kubernetes error: {}", e),
            Error::InvalidSelector(msg) => format!("Selector rejected: {}", msg),
            Error::InvalidTimeout {
                condition_type,
                timeout,
                ..
            } => format!(
                "Unhealthy condition {} has an invalid timeout {:?}",
                condition_type, timeout
            ),
            Error::Conflict { kind, name } => {
                format!("{} {} changed concurrently, will retry", kind, name)
            }
            Error::RemediationError(msg) => format!("Remediation failed: {}", msg),
            _ => self.to_string(),
        }
    }

    /// Classify a kube API error for the given object into `NotFound` / `Conflict`
    pub fn from_kube(err: kube::Error, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        match err {
            kube::Error::Api(ref e) if e.code == 404 => Error::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.unwrap_or_default().to_string(),
            },
            kube::Error::Api(ref e) if e.code == 409 => Error::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            other => Error::KubeError(other),
        }
    }
}
