//! Streaming-log cluster client
//!
//! The reconciler drives the remote cluster through this trait; the HTTP
//! implementation targets the cluster's admin API. A connection is
//! established and torn down per reconciliation attempt.

use crate::crd::StreamSpec;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

const CONNECTION_NAME_HEADER: &str = "x-streamlog-connection-name";

/// Options applied when connecting to a streaming-log cluster.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Connection name reported to the cluster, for observability
    pub connection_name: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connection_name: "streamlog-operator".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Client for stream administration on a remote streaming-log cluster.
#[async_trait]
pub trait StreamLogClient: Send + Sync {
    /// Establish a connection against the given server endpoints.
    async fn connect(&self, servers: &[String], options: &ConnectOptions) -> Result<()>;

    /// Whether a stream with the given name exists on the cluster.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Create a stream from the full spec.
    async fn create(&self, spec: &StreamSpec) -> Result<()>;

    /// Update an existing stream from the full spec.
    async fn update(&self, spec: &StreamSpec) -> Result<()>;

    /// Delete a stream by name. Deleting an absent stream is not an error.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Tear down the connection.
    async fn close(&self);
}

struct Connection {
    base_url: String,
    connection_name: String,
}

/// `StreamLogClient` backed by the cluster's HTTP admin API.
pub struct HttpStreamLogClient {
    http: reqwest::Client,
    connection: Mutex<Option<Connection>>,
}

impl HttpStreamLogClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OperatorError::Connection(e.to_string()))?;
        Ok(Self {
            http,
            connection: Mutex::new(None),
        })
    }

    fn connected(&self) -> Result<(String, String)> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| (c.base_url.clone(), c.connection_name.clone()))
            .ok_or_else(|| OperatorError::Connection("not connected".to_string()))
    }

    fn stream_url(base_url: &str, name: &str) -> String {
        format!("{base_url}/api/v1/streams/{name}")
    }
}

/// Normalize a server endpoint into a base URL the admin API accepts.
fn normalize_server(server: &str) -> String {
    let trimmed = server.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[async_trait]
impl StreamLogClient for HttpStreamLogClient {
    async fn connect(&self, servers: &[String], options: &ConnectOptions) -> Result<()> {
        if servers.is_empty() {
            return Err(OperatorError::Connection(
                "no servers configured".to_string(),
            ));
        }

        let mut last_error = String::new();
        for server in servers {
            let base_url = normalize_server(server);
            let probe = self
                .http
                .get(format!("{base_url}/api/v1/healthz"))
                .header(CONNECTION_NAME_HEADER, &options.connection_name)
                .send()
                .await;
            match probe {
                Ok(resp) if resp.status().is_success() => {
                    debug!(server = %base_url, "connected to streamlog cluster");
                    *self
                        .connection
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(Connection {
                        base_url,
                        connection_name: options.connection_name.clone(),
                    });
                    return Ok(());
                }
                Ok(resp) => {
                    last_error = format!("{base_url}: status {}", resp.status());
                }
                Err(e) => {
                    last_error = format!("{base_url}: {e}");
                }
            }
        }

        Err(OperatorError::Connection(format!(
            "no reachable server: {last_error}"
        )))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let (base_url, connection_name) = self.connected()?;
        let resp = self
            .http
            .get(Self::stream_url(&base_url, name))
            .header(CONNECTION_NAME_HEADER, &connection_name)
            .send()
            .await
            .map_err(|e| OperatorError::StreamLog(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if resp.status().is_success() {
            return Ok(true);
        }
        Err(OperatorError::StreamLog(format!(
            "stream lookup for {name:?} failed: status {}",
            resp.status()
        )))
    }

    async fn create(&self, spec: &StreamSpec) -> Result<()> {
        let (base_url, connection_name) = self.connected()?;
        let resp = self
            .http
            .post(format!("{base_url}/api/v1/streams"))
            .header(CONNECTION_NAME_HEADER, &connection_name)
            .json(spec)
            .send()
            .await
            .map_err(|e| OperatorError::StreamLog(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OperatorError::StreamLog(format!(
                "failed to create stream {:?}: status {}",
                spec.name,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn update(&self, spec: &StreamSpec) -> Result<()> {
        let (base_url, connection_name) = self.connected()?;
        let resp = self
            .http
            .put(Self::stream_url(&base_url, &spec.name))
            .header(CONNECTION_NAME_HEADER, &connection_name)
            .json(spec)
            .send()
            .await
            .map_err(|e| OperatorError::StreamLog(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OperatorError::StreamLog(format!(
                "failed to update stream {:?}: status {}",
                spec.name,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let (base_url, connection_name) = self.connected()?;
        let resp = self
            .http
            .delete(Self::stream_url(&base_url, name))
            .header(CONNECTION_NAME_HEADER, &connection_name)
            .send()
            .await
            .map_err(|e| OperatorError::StreamLog(e.to_string()))?;

        // Deleting a stream that is already gone must succeed
        if resp.status() == reqwest::StatusCode::NOT_FOUND || resp.status().is_success() {
            return Ok(());
        }
        Err(OperatorError::StreamLog(format!(
            "failed to delete stream {name:?}: status {}",
            resp.status()
        )))
    }

    async fn close(&self) {
        *self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_server() {
        assert_eq!(normalize_server("broker-0:8080"), "http://broker-0:8080");
        assert_eq!(
            normalize_server("http://broker-0:8080/"),
            "http://broker-0:8080"
        );
        assert_eq!(
            normalize_server("https://broker-0:8080"),
            "https://broker-0:8080"
        );
        assert_eq!(normalize_server(" broker-0:8080 "), "http://broker-0:8080");
    }

    #[test]
    fn test_operations_require_connection() {
        let client = HttpStreamLogClient::new(Duration::from_secs(1)).unwrap();
        assert!(client.connected().is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_server_list() {
        let client = HttpStreamLogClient::new(Duration::from_secs(1)).unwrap();
        let err = client
            .connect(&[], &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no servers configured"));
    }
}
