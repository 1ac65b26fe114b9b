//! Event recording seam
//!
//! Informational events are fire-and-forget: a failure to record never
//! affects reconciliation, it is logged and dropped.

use crate::crd::Stream;
use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

/// Best-effort sink for informational events about a Stream.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn normal(&self, stream: &Stream, reason: &str, message: &str);
}

/// `EventSink` backed by the Kubernetes events API.
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn normal(&self, stream: &Stream, reason: &str, message: &str) {
        let reference = stream.object_ref(&());
        let event = Event {
            type_: EventType::Normal,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: reason.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &reference).await {
            warn!("Failed to record {} event: {}", reason, e);
        }
    }
}
