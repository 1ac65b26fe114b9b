//! Controllers for the Streamlog Operator
//!
//! The stream controller watches the Stream CRD and reconciles the remote
//! streaming-log cluster with the desired state declared in each resource.

mod stream;

pub use stream::{
    decide, deletion_state, DeletionState, ReconcileAction, StreamController,
    StreamControllerConfig, DEFAULT_MAX_QUEUE_RETRIES,
};
