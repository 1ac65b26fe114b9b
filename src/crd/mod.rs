//! Custom Resource Definitions for the Streamlog Operator
//!
//! Defines the single CRD the operator manages:
//! - Stream: a message stream on a remote streaming-log cluster

mod stream;

pub use stream::{Stream, StreamCondition, StreamSpec, StreamStatus};
