//! Streamlog Kubernetes Operator
//!
//! This operator manages Stream resources against a remote streaming-log
//! cluster.
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! streamlog-operator
//!
//! # Run with custom log level
//! RUST_LOG=debug streamlog-operator
//! ```

use clap::Parser;
use kube::api::Api;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use streamlog_operator::controllers::DEFAULT_MAX_QUEUE_RETRIES;
use streamlog_operator::streamlog::ConnectOptions;
use streamlog_operator::{
    HttpStreamLogClient, KubeEventSink, KubeStreamApi, Stream, StreamController,
    StreamControllerConfig,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONTROLLER_NAME: &str = "streamlog-operator";

/// Streamlog Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "streamlog-operator")]
#[command(version, about = "Kubernetes Operator for streaming-log clusters")]
struct Args {
    /// Namespace to watch (empty for all namespaces)
    #[arg(long, default_value = "")]
    namespace: String,

    /// Connection name reported to the streaming-log cluster
    #[arg(long, default_value = CONTROLLER_NAME)]
    connection_name: String,

    /// Retry ceiling for a failing stream before it is dropped from the queue
    #[arg(long, default_value_t = DEFAULT_MAX_QUEUE_RETRIES)]
    max_queue_retries: u32,

    /// Timeout in seconds for requests against the streaming-log cluster
    #[arg(long, default_value_t = 5)]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting Streamlog Kubernetes Operator");
    info!(
        "Watching namespace: {}",
        if args.namespace.is_empty() {
            "all"
        } else {
            &args.namespace
        }
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let request_timeout = Duration::from_secs(args.request_timeout_secs);
    let streamlog_client = HttpStreamLogClient::new(request_timeout)?;

    let config = StreamControllerConfig {
        connect_options: ConnectOptions {
            connection_name: args.connection_name,
            timeout: request_timeout,
        },
        max_queue_retries: args.max_queue_retries,
        ..Default::default()
    };

    let controller = Arc::new(StreamController::new(
        Arc::new(KubeStreamApi::new(client.clone())),
        Arc::new(KubeEventSink::new(client.clone(), CONTROLLER_NAME)),
        Arc::new(streamlog_client),
        config,
    ));

    let streams: Api<Stream> = if args.namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, &args.namespace)
    };

    // ctrl_c flips the controller into drain mode; run returns only after
    // the worker has finished its in-flight reconcile and the queue is empty
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    };

    match controller.run(streams, shutdown).await {
        Ok(()) => info!("Stream controller finished"),
        Err(e) => error!("Stream controller error: {}", e),
    }

    info!("Streamlog Operator shutting down");
    Ok(())
}
