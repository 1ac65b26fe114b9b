//! Stream Controller
//!
//! Reconciles Stream custom resources against a remote streaming-log
//! cluster: watch notifications are filtered and enqueued, a worker drains
//! the queue one key at a time, and each reconciliation recomputes the
//! required action (create, update, delete, or nothing) from the current
//! cached object and a live existence check. Outcomes are recorded on the
//! Stream status; physical deletion is gated behind a finalizer.

use crate::api::StreamApi;
use crate::conditions::{
    build_condition, prune_conditions, upsert_condition, CONDITION_FALSE, CONDITION_TRUE,
    STREAM_CONDITION_READY, STREAM_FINALIZER,
};
use crate::crd::Stream;
use crate::error::{OperatorError, Result};
use crate::events::EventSink;
use crate::queue::WorkQueue;
use crate::store::{object_key, split_key, StreamStore};
use crate::streamlog::{ConnectOptions, StreamLogClient};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Give up re-queueing a key after this many failed attempts.
pub const DEFAULT_MAX_QUEUE_RETRIES: u32 = 10;

/// Bound on any single write against the Kubernetes API.
const API_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// The action a reconciliation pass must take to converge the remote
/// cluster with the desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Create,
    Update,
    Delete,
    Converged,
}

/// Compute the required action. Deletion wins over everything; a generation
/// the controller has not observed yet forces an update or create depending
/// on whether the stream already exists remotely.
pub fn decide(
    exists_remotely: bool,
    delete_requested: bool,
    generation_changed: bool,
) -> ReconcileAction {
    if delete_requested {
        return ReconcileAction::Delete;
    }
    if !generation_changed {
        return ReconcileAction::Converged;
    }
    if exists_remotely {
        ReconcileAction::Update
    } else {
        ReconcileAction::Create
    }
}

/// Where the object stands in the two-phase delete protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    /// Not being deleted
    Active,
    /// Deletion requested, our finalizer still gates removal
    Deleting,
    /// Deletion requested and nothing left for us to gate
    Gone,
}

/// Derive the deletion state from the deletion timestamp and finalizer set.
pub fn deletion_state(stream: &Stream) -> DeletionState {
    let delete_requested = stream.metadata.deletion_timestamp.is_some();
    let gated = stream.finalizers().iter().any(|f| f == STREAM_FINALIZER);
    match (delete_requested, gated) {
        (false, _) => DeletionState::Active,
        (true, true) => DeletionState::Deleting,
        (true, false) => DeletionState::Gone,
    }
}

/// What the change notifier should do with an update notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateDisposition {
    Enqueue,
    Skip,
}

/// Validate an update notification.
///
/// A change to the deletion timestamp always passes through so the
/// reconciler sees the deletion state. Changes to immutable spec fields are
/// rejected; a semantically unchanged spec is a no-op.
pub(crate) fn validate_update(prev: &Stream, next: &Stream) -> Result<UpdateDisposition> {
    if prev.metadata.deletion_timestamp != next.metadata.deletion_timestamp {
        return Ok(UpdateDisposition::Enqueue);
    }

    if prev.spec.name != next.spec.name {
        return Err(OperatorError::Validation(
            "updating stream name is not allowed, please recreate".to_string(),
        ));
    }
    if prev.spec.storage != next.spec.storage {
        return Err(OperatorError::Validation(
            "updating stream storage is not allowed, please recreate".to_string(),
        ));
    }

    if prev.spec == next.spec {
        return Ok(UpdateDisposition::Skip);
    }

    Ok(UpdateDisposition::Enqueue)
}

/// Configuration for the stream controller
#[derive(Debug, Clone)]
pub struct StreamControllerConfig {
    /// Options for connections to the streaming-log cluster
    pub connect_options: ConnectOptions,
    /// Retry ceiling before a failing key is dropped from the queue
    pub max_queue_retries: u32,
    /// First requeue delay after a failure
    pub retry_base_delay: Duration,
    /// Upper bound on the requeue delay
    pub retry_max_delay: Duration,
}

impl Default for StreamControllerConfig {
    fn default() -> Self {
        Self {
            connect_options: ConnectOptions::default(),
            max_queue_retries: DEFAULT_MAX_QUEUE_RETRIES,
            retry_base_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_secs(1000),
        }
    }
}

/// Context for the stream controller
pub struct StreamController {
    store: Arc<StreamStore>,
    queue: Arc<WorkQueue>,
    api: Arc<dyn StreamApi>,
    events: Arc<dyn EventSink>,
    client: Arc<dyn StreamLogClient>,
    connect_options: ConnectOptions,
    max_queue_retries: u32,
}

impl StreamController {
    /// Create a new stream controller
    pub fn new(
        api: Arc<dyn StreamApi>,
        events: Arc<dyn EventSink>,
        client: Arc<dyn StreamLogClient>,
        config: StreamControllerConfig,
    ) -> Self {
        Self {
            store: Arc::new(StreamStore::new()),
            queue: Arc::new(WorkQueue::with_delays(
                config.retry_base_delay,
                config.retry_max_delay,
            )),
            api,
            events,
            client,
            connect_options: config.connect_options,
            max_queue_retries: config.max_queue_retries,
        }
    }

    pub fn store(&self) -> &StreamStore {
        &self.store
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Run the controller: watch loop feeding the queue, worker draining it.
    /// Returns when the watch stream ends or the shutdown future resolves;
    /// either way the worker finishes its current item and drains the queue
    /// before this returns.
    pub async fn run(
        self: Arc<Self>,
        streams: Api<Stream>,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<()> {
        info!("Starting Stream controller");

        let worker = tokio::spawn(Arc::clone(&self).run_worker());
        let watch = Arc::clone(&self).run_watch(streams);
        tokio::pin!(watch);

        let watch_result = tokio::select! {
            result = &mut watch => result,
            () = shutdown => {
                info!("Shutdown requested, draining worker");
                Ok(())
            }
        };

        self.queue.shutdown();
        worker
            .await
            .map_err(|e| OperatorError::Reconciliation(format!("worker task failed: {e}")))?;
        watch_result
    }

    /// Drive watch notifications into the cache and the work queue.
    async fn run_watch(self: Arc<Self>, streams: Api<Stream>) -> Result<()> {
        let mut events = watcher(streams, watcher::Config::default())
            .default_backoff()
            .boxed();

        let mut relisted: Vec<Stream> = Vec::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(watcher::Event::Init) => relisted.clear(),
                Ok(watcher::Event::InitApply(stream)) => relisted.push(stream),
                Ok(watcher::Event::InitDone) => {
                    let streams = std::mem::take(&mut relisted);
                    let keys: Vec<String> = streams.iter().map(object_key).collect();
                    self.store.replace_all(streams);
                    for key in &keys {
                        self.queue.add(key);
                    }
                    info!("Resynced {} streams", keys.len());
                }
                Ok(watcher::Event::Apply(stream)) => self.handle_apply(stream).await,
                Ok(watcher::Event::Delete(stream)) => self.handle_delete(&stream),
                // Watch errors are transient; the watcher restarts itself
                Err(e) => warn!("Stream watch error: {}", e),
            }
        }
        info!("Stream watch ended");
        Ok(())
    }

    /// Handle an add/update notification.
    ///
    /// The cache is refreshed unconditionally; whether the key is enqueued
    /// depends on the update filter. An immutable-field violation is written
    /// to the status and never enqueued.
    pub async fn handle_apply(&self, next: Stream) {
        let key = object_key(&next);
        let prev = self.store.get_by_key(&key);
        self.store.insert(next.clone());

        let Some(prev) = prev else {
            debug!("Stream {} added", key);
            self.queue.add(&key);
            return;
        };

        match validate_update(&prev, &next) {
            Ok(UpdateDisposition::Enqueue) => self.queue.add(&key),
            Ok(UpdateDisposition::Skip) => {
                debug!("Stream {} unchanged, skipping", key);
            }
            Err(err) => {
                let err = match self.set_errored(&next, &err).await {
                    Ok(_) => err,
                    Err(serr) => err.fold(serr),
                };
                error!("Rejected update for stream {}: {}", key, err);
            }
        }
    }

    /// Handle a delete notification. The object is already gone from the API
    /// server at this point; the finalizer protocol ran during earlier
    /// applies, so this only tidies the cache and wakes the reconciler.
    pub fn handle_delete(&self, stream: &Stream) {
        let key = object_key(stream);
        self.store.remove(stream);
        self.queue.add(&key);
    }

    /// Drain the work queue until shutdown. A failed key is re-queued with
    /// backoff up to the retry ceiling, then dropped; one key's failure never
    /// stops the loop.
    pub async fn run_worker(self: Arc<Self>) {
        while let Some(key) = self.queue.get().await {
            match self.process(&key).await {
                Ok(()) => self.queue.forget(&key),
                // A key that does not parse will never parse; drop it
                Err(OperatorError::InvalidKey(msg)) => {
                    error!("Dropping malformed work item {}: {}", key, msg);
                    self.queue.forget(&key);
                }
                Err(err) => self.requeue_or_drop(&key, &err),
            }
            self.queue.done(&key);
        }
        info!("Stream worker drained, exiting");
    }

    fn requeue_or_drop(&self, key: &str, err: &OperatorError) {
        error!("Failed to process stream {}: {}", key, err);
        let attempts = self.queue.num_requeues(key);
        if attempts < self.max_queue_retries {
            self.queue.add_rate_limited(key);
        } else {
            warn!(
                "Giving up on stream {} after {} attempts; a new spec change will retry",
                key,
                attempts + 1
            );
            self.queue.forget(key);
        }
    }

    /// Reconcile one key. A key missing from the cache means the object is
    /// already deleted and there is nothing to do.
    pub async fn process(&self, key: &str) -> Result<()> {
        let (namespace, name) = split_key(key)?;
        let Some(cached) = self.store.get(namespace, name) else {
            debug!("Stream {} no longer cached, nothing to do", key);
            return Ok(());
        };
        // Work on a deep copy; cached state is never mutated in place
        let stream = (*cached).clone();

        if let Err(err) = self
            .client
            .connect(&stream.spec.servers, &self.connect_options)
            .await
        {
            return Err(self.errored(&stream, err).await);
        }
        let result = self.reconcile(&stream).await;
        self.client.close().await;
        result
    }

    async fn reconcile(&self, stream: &Stream) -> Result<()> {
        let delete_requested = stream.metadata.deletion_timestamp.is_some();
        let observed = stream.status.as_ref().and_then(|s| s.observed_generation);
        let generation_changed = stream.metadata.generation != observed;

        let exists_remotely = match self.client.exists(&stream.spec.name).await {
            Ok(exists) => exists,
            Err(err) => return Err(self.errored(stream, err).await),
        };

        match decide(exists_remotely, delete_requested, generation_changed) {
            ReconcileAction::Create => self.create_stream(stream).await,
            ReconcileAction::Update => self.update_stream(stream).await,
            ReconcileAction::Delete => self.delete_stream(stream).await,
            ReconcileAction::Converged => Ok(()),
        }
    }

    async fn create_stream(&self, stream: &Stream) -> Result<()> {
        let name = stream.spec.name.clone();
        self.events
            .normal(stream, "Creating", &format!("Creating stream {name:?}"))
            .await;

        if let Err(err) = self.client.create(&stream.spec).await {
            return Err(self.errored(stream, err).await);
        }

        let persisted = self.finish_converge(stream).await?;
        self.events
            .normal(&persisted, "Created", &format!("Created stream {name:?}"))
            .await;
        Ok(())
    }

    async fn update_stream(&self, stream: &Stream) -> Result<()> {
        let name = stream.spec.name.clone();
        self.events
            .normal(stream, "Updating", &format!("Updating stream {name:?}"))
            .await;

        if let Err(err) = self.client.update(&stream.spec).await {
            return Err(self.errored(stream, err).await);
        }

        let persisted = self.finish_converge(stream).await?;
        self.events
            .normal(&persisted, "Updated", &format!("Updated stream {name:?}"))
            .await;
        Ok(())
    }

    /// Shared tail of create and update: gate deletion with the finalizer,
    /// then record the synced status.
    async fn finish_converge(&self, stream: &Stream) -> Result<Stream> {
        let stream = match self.set_finalizer(stream).await {
            Ok(s) => s,
            Err(err) => return Err(self.errored(stream, err).await),
        };
        self.set_synced(&stream).await
    }

    async fn delete_stream(&self, stream: &Stream) -> Result<()> {
        let name = stream.spec.name.clone();
        self.events
            .normal(stream, "Deleting", &format!("Deleting stream {name:?}"))
            .await;

        if let Err(err) = self.client.delete(&name).await {
            return Err(self.errored(stream, err).await);
        }

        if let Err(err) = self.clear_finalizer(stream).await {
            return Err(self.errored(stream, err).await);
        }

        // No status write after a successful delete; the object is on its
        // way out and a write would race the garbage collector.
        Ok(())
    }

    /// Record the failure on the status and hand the error back for requeue,
    /// folding in a secondary status-write failure if one occurs.
    async fn errored(&self, stream: &Stream, err: OperatorError) -> OperatorError {
        match self.set_errored(stream, &err).await {
            Ok(_) => err,
            Err(serr) => err.fold(serr),
        }
    }

    /// Upsert `Ready=False reason=Errored` with the error text and persist.
    async fn set_errored(&self, stream: &Stream, err: &OperatorError) -> Result<Stream> {
        let mut copy = stream.clone();
        let status = copy.status.get_or_insert_with(Default::default);
        upsert_condition(
            &mut status.conditions,
            build_condition(
                STREAM_CONDITION_READY,
                CONDITION_FALSE,
                "Errored",
                &err.to_string(),
            ),
        );
        prune_conditions(&mut status.conditions);

        self.write_status(&copy).await.map_err(|e| {
            OperatorError::Reconciliation(format!(
                "failed to set errored status for {}: {e}",
                object_key(stream)
            ))
        })
    }

    /// Record the observed generation and `Ready=True reason=Synced`.
    async fn set_synced(&self, stream: &Stream) -> Result<Stream> {
        let mut copy = stream.clone();
        let status = copy.status.get_or_insert_with(Default::default);
        status.observed_generation = stream.metadata.generation;
        upsert_condition(
            &mut status.conditions,
            build_condition(
                STREAM_CONDITION_READY,
                CONDITION_TRUE,
                "Synced",
                "Stream is synced with spec",
            ),
        );
        prune_conditions(&mut status.conditions);

        self.write_status(&copy).await.map_err(|e| {
            OperatorError::Reconciliation(format!(
                "failed to set synced status for stream {:?}: {e}",
                stream.spec.name
            ))
        })
    }

    /// Add the finalizer if absent; the API layer will then hold the object
    /// until we clear it.
    async fn set_finalizer(&self, stream: &Stream) -> Result<Stream> {
        if stream.finalizers().iter().any(|f| f == STREAM_FINALIZER) {
            return Ok(stream.clone());
        }

        let mut copy = stream.clone();
        copy.metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(STREAM_FINALIZER.to_string());

        self.write_metadata(&copy).await.map_err(|e| {
            OperatorError::Reconciliation(format!(
                "failed to set finalizer for {}: {e}",
                object_key(stream)
            ))
        })
    }

    /// Remove our finalizer once the external stream is gone, releasing the
    /// object for physical deletion. Other finalizers keep their order.
    async fn clear_finalizer(&self, stream: &Stream) -> Result<Stream> {
        match deletion_state(stream) {
            DeletionState::Active | DeletionState::Gone => return Ok(stream.clone()),
            DeletionState::Deleting => {}
        }

        let mut copy = stream.clone();
        if let Some(finalizers) = copy.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != STREAM_FINALIZER);
        }

        self.write_metadata(&copy).await.map_err(|e| {
            OperatorError::Reconciliation(format!(
                "failed to clear finalizer for {}: {e}",
                object_key(stream)
            ))
        })
    }

    async fn write_status(&self, stream: &Stream) -> Result<Stream> {
        match tokio::time::timeout(API_WRITE_TIMEOUT, self.api.update_status(stream)).await {
            Ok(result) => result,
            Err(_) => Err(OperatorError::KubeApi(format!(
                "status write for {} timed out",
                object_key(stream)
            ))),
        }
    }

    async fn write_metadata(&self, stream: &Stream) -> Result<Stream> {
        match tokio::time::timeout(API_WRITE_TIMEOUT, self.api.update(stream)).await {
            Ok(result) => result,
            Err(_) => Err(OperatorError::KubeApi(format!(
                "metadata write for {} timed out",
                object_key(stream)
            ))),
        }
    }
}
