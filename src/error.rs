//! Error types for the Streamlog Kubernetes Operator

use std::fmt;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur during operator operations
#[derive(Debug, Clone)]
pub enum OperatorError {
    /// Kubernetes API error
    KubeApi(String),
    /// Failed to connect to the streaming-log cluster
    Connection(String),
    /// Remote streaming-log operation failed
    StreamLog(String),
    /// Rejected update to an immutable spec field
    Validation(String),
    /// Reconciliation error
    Reconciliation(String),
    /// Serialization error
    Serialization(String),
    /// Malformed work queue key
    InvalidKey(String),
}

impl OperatorError {
    /// Fold a secondary failure (e.g. a failed Errored status write) into the
    /// primary error, keeping a single combined message.
    pub fn fold(self, secondary: OperatorError) -> OperatorError {
        OperatorError::Reconciliation(format!("{self}: {secondary}"))
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorError::KubeApi(msg) => write!(f, "Kubernetes API error: {}", msg),
            OperatorError::Connection(msg) => write!(f, "Connection error: {}", msg),
            OperatorError::StreamLog(msg) => write!(f, "Streamlog error: {}", msg),
            OperatorError::Validation(msg) => write!(f, "Validation error: {}", msg),
            OperatorError::Reconciliation(msg) => write!(f, "Reconciliation error: {}", msg),
            OperatorError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            OperatorError::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
        }
    }
}

impl std::error::Error for OperatorError {}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        OperatorError::KubeApi(err.to_string())
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OperatorError::Connection("no servers reachable".to_string());
        assert!(err.to_string().contains("Connection error"));
    }

    #[test]
    fn test_fold_combines_messages() {
        let primary = OperatorError::StreamLog("create failed".to_string());
        let secondary = OperatorError::KubeApi("status write timed out".to_string());
        let combined = primary.fold(secondary);
        let msg = combined.to_string();
        assert!(msg.contains("create failed"));
        assert!(msg.contains("status write timed out"));
    }

    #[test]
    fn test_error_variants() {
        let errors = vec![
            OperatorError::KubeApi("api".to_string()),
            OperatorError::Connection("connect".to_string()),
            OperatorError::StreamLog("remote".to_string()),
            OperatorError::Validation("immutable".to_string()),
            OperatorError::Reconciliation("reconcile".to_string()),
            OperatorError::Serialization("serde".to_string()),
            OperatorError::InvalidKey("junk".to_string()),
        ];

        for err in errors {
            // Ensure Display is implemented
            let _ = format!("{}", err);
        }
    }
}
