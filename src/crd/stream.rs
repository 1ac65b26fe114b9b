//! Stream Custom Resource Definition
//!
//! Defines the specification for a message stream managed on a remote
//! streaming-log cluster. The controller owns only the status subresource
//! and the finalizer set; the spec belongs to the user.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stream is the Schema for the streams API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "streamlog.io",
    version = "v1alpha1",
    kind = "Stream",
    namespaced,
    status = "StreamStatus",
    shortname = "str",
    printcolumn = r#"{"name":"Stream","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Storage","type":"string","jsonPath":".spec.storage"}"#,
    printcolumn = r#"{"name":"Observed","type":"integer","jsonPath":".status.observedGeneration"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StreamSpec {
    /// Name of the stream on the remote cluster. Immutable after creation.
    pub name: String,

    /// Storage backend for the stream: file or memory. Immutable after creation.
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Connection endpoints of the streaming-log cluster
    #[serde(default)]
    pub servers: Vec<String>,

    /// Subjects bound to the stream
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Retention policy: limits, interest, or workqueue
    #[serde(default = "default_retention")]
    pub retention: String,

    /// Number of stream replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Maximum number of messages retained (-1 for unlimited)
    #[serde(default = "default_unlimited")]
    pub max_msgs: i64,

    /// Maximum total size in bytes (-1 for unlimited)
    #[serde(default = "default_unlimited")]
    pub max_bytes: i64,

    /// Maximum message age, e.g. "168h" (empty for unlimited)
    #[serde(default)]
    pub max_age: String,

    /// Maximum number of consumers (-1 for unlimited)
    #[serde(default = "default_unlimited_i32")]
    pub max_consumers: i32,

    /// Discard policy when limits are reached: old or new
    #[serde(default = "default_discard")]
    pub discard: String,

    /// Window for duplicate message tracking, e.g. "2m"
    #[serde(default)]
    pub duplicate_window: String,
}

/// Status of the Stream
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Last generation this controller successfully reconciled
    #[serde(default)]
    pub observed_generation: Option<i64>,

    /// Conditions representing stream state
    #[serde(default)]
    pub conditions: Vec<StreamCondition>,
}

/// Condition of the stream
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

// Default value functions
fn default_storage() -> String {
    "file".to_string()
}

fn default_retention() -> String {
    "limits".to_string()
}

fn default_replicas() -> i32 {
    1
}

fn default_unlimited() -> i64 {
    -1
}

fn default_unlimited_i32() -> i32 {
    -1
}

fn default_discard() -> String {
    "old".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_spec_defaults() {
        let json = r#"{"name": "orders"}"#;
        let spec: StreamSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "orders");
        assert_eq!(spec.storage, "file");
        assert_eq!(spec.retention, "limits");
        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.max_msgs, -1);
        assert_eq!(spec.max_bytes, -1);
        assert_eq!(spec.discard, "old");
    }

    #[test]
    fn test_stream_spec_equality_ignores_nothing() {
        let a: StreamSpec = serde_json::from_str(r#"{"name": "orders"}"#).unwrap();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.max_msgs = 1_000_000;
        assert_ne!(a, b);
    }

    #[test]
    fn test_status_default_is_empty() {
        let status = StreamStatus::default();
        assert!(status.observed_generation.is_none());
        assert!(status.conditions.is_empty());
    }
}
