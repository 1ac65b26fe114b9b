//! Kubernetes API seam for Stream persistence
//!
//! The reconciler talks to the API server through this trait so it can run
//! against mocks in tests. The kube-backed implementation mirrors how the
//! controller writes: merge patches against metadata (finalizers) and the
//! status subresource.

use crate::crd::Stream;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};

/// Client for persisting Stream mutations.
#[async_trait]
pub trait StreamApi: Send + Sync {
    /// Persist metadata changes (the finalizer set), returning the stored object.
    async fn update(&self, stream: &Stream) -> Result<Stream>;

    /// Persist status changes (conditions, observedGeneration), returning the
    /// stored object.
    async fn update_status(&self, stream: &Stream) -> Result<Stream>;
}

/// `StreamApi` backed by the Kubernetes API server.
pub struct KubeStreamApi {
    client: Client,
}

impl KubeStreamApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_for(&self, stream: &Stream) -> Api<Stream> {
        let namespace = stream.namespace().unwrap_or_else(|| "default".to_string());
        Api::namespaced(self.client.clone(), &namespace)
    }
}

#[async_trait]
impl StreamApi for KubeStreamApi {
    async fn update(&self, stream: &Stream) -> Result<Stream> {
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": stream.metadata.finalizers,
            }
        });
        self.api_for(stream)
            .patch(
                &stream.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| OperatorError::KubeApi(e.to_string()))
    }

    async fn update_status(&self, stream: &Stream) -> Result<Stream> {
        let patch = serde_json::json!({ "status": stream.status });
        self.api_for(stream)
            .patch_status(
                &stream.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| OperatorError::KubeApi(e.to_string()))
    }
}
