//! Streamlog Kubernetes Operator
//!
//! A Kubernetes operator that synchronizes `Stream` custom resources with a
//! remote streaming-log cluster.
//!
//! ## Custom Resources
//!
//! - `Stream`: a message stream definition (storage, retention, limits)
//!   realized on the cluster named by `spec.servers`
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: streamlog.io/v1alpha1
//! kind: Stream
//! metadata:
//!   name: orders
//! spec:
//!   name: orders
//!   storage: file
//!   servers:
//!     - broker-0.streamlog.svc:8080
//!   subjects:
//!     - orders.>
//! ```

pub mod api;
pub mod conditions;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod events;
pub mod queue;
pub mod store;
pub mod streamlog;

pub use api::{KubeStreamApi, StreamApi};
pub use controllers::{StreamController, StreamControllerConfig};
pub use crd::{Stream, StreamCondition, StreamSpec, StreamStatus};
pub use error::{OperatorError, Result};
pub use events::{EventSink, KubeEventSink};
pub use queue::WorkQueue;
pub use store::StreamStore;
pub use streamlog::{ConnectOptions, HttpStreamLogClient, StreamLogClient};
