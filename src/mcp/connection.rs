//! Process-wide cache of hub connections keyed by URL.
//!
//! Connections are replaced, never repaired: a dead or expired one is evicted
//! and a fresh handshake runs on next use. Session expiry is retried exactly
//! once through [`ConnectionManager::with_session_retry`].

use crate::mcp::client::McpClient;
use crate::mcp::transport::{select_transport, TransportKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_mcp_schema::{GetPromptResult, ListPromptsResult, ListResourcesResult, ReadResourceResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MCP_HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS: u64 = 90;
const MCP_HTTP_POOL_MAX_IDLE_PER_HOST: usize = 8;

/// Upper bound on tools accepted from one listing, and on the pages fetched
/// to collect them.
pub const MCP_MAX_TOOL_LIST: usize = 100;

/// A tool as advertised by the hub. The input schema is kept raw so the
/// converter sees exactly what the hub sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPage {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Raw result of a remote tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({ "type": "text", "text": text.into() })],
            is_error: false,
        }
    }
}

/// An initialized session with the hub.
#[async_trait]
pub trait HubConnection: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn list_tools(&self, cursor: Option<String>) -> Result<ToolPage, String>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallOutcome, String>;

    async fn list_resources(&self) -> Result<ListResourcesResult, String>;

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, String>;

    async fn list_prompts(&self) -> Result<ListPromptsResult, String>;

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult, String>;

    async fn close(&self) {}
}

/// Opens new hub connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str, kind: TransportKind)
        -> Result<Arc<dyn HubConnection>, String>;
}

fn mcp_http_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(MCP_HTTP_CONNECT_TIMEOUT_SECONDS))
        .pool_idle_timeout(Duration::from_secs(MCP_HTTP_POOL_IDLE_TIMEOUT_SECONDS))
        .pool_max_idle_per_host(MCP_HTTP_POOL_MAX_IDLE_PER_HOST)
}

/// Client for request/response exchanges; every request is bounded by
/// `request_timeout` until its body completes.
pub fn build_mcp_http_client(request_timeout: Duration) -> Result<reqwest::Client, String> {
    mcp_http_client_builder()
        .timeout(request_timeout)
        .build()
        .map_err(|err| err.to_string())
}

/// Client for long-lived event streams. Only connecting is bounded; callers
/// set per-request timeouts on anything that is not a stream.
pub fn build_mcp_stream_client() -> Result<reqwest::Client, String> {
    mcp_http_client_builder()
        .build()
        .map_err(|err| err.to_string())
}

/// Connects over the network with the real MCP client.
pub struct HttpConnector {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration) -> Result<Self, String> {
        Ok(Self {
            http: build_mcp_http_client(request_timeout)?,
            stream_http: build_mcp_stream_client()?,
            request_timeout,
        })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        url: &str,
        kind: TransportKind,
    ) -> Result<Arc<dyn HubConnection>, String> {
        let http = match kind {
            TransportKind::Sse => self.stream_http.clone(),
            TransportKind::StreamableHttp => self.http.clone(),
        };
        let client = McpClient::connect(http, url, kind, self.request_timeout).await?;
        Ok(Arc::new(client))
    }
}

pub struct Connection {
    pub kind: TransportKind,
    pub client: Arc<dyn HubConnection>,
    pub connected_at: DateTime<Utc>,
}

/// Returns true when an error message indicates the hub no longer
/// recognizes the session.
pub fn is_session_error(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("no valid session id")
        || message.contains("session id")
        || message.contains("invalid session")
        || (message.contains("400") && message.contains("session"))
}

/// Returns true for errors that should drop the cached connection.
pub fn is_connection_error(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("connection")
        || lowered.contains("timeout")
        || lowered.contains("timed out")
        || lowered.contains("transport")
        || is_session_error(message)
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    connect_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    call_timeout: Duration,
    session_classifier: fn(&str) -> bool,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, call_timeout: Duration) -> Self {
        Self {
            connector,
            connections: RwLock::new(HashMap::new()),
            connect_locks: Mutex::new(HashMap::new()),
            call_timeout,
            session_classifier: is_session_error,
        }
    }

    /// Swaps the session-error predicate.
    pub fn with_session_classifier(mut self, classifier: fn(&str) -> bool) -> Self {
        self.session_classifier = classifier;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// The cached connection for `url`, if one is live. Never connects.
    pub fn cached(&self, url: &str) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .filter(|connection| connection.client.is_connected())
            .cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Reuses the cached connection or runs one handshake for `url`, even
    /// under concurrent first access.
    pub async fn get_connection(&self, url: &str) -> Result<Arc<Connection>, String> {
        if let Some(connection) = self.cached(url) {
            return Ok(connection);
        }

        let url_lock = {
            let mut locks = self.connect_locks.lock().await;
            locks
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = url_lock.lock().await;

        if let Some(connection) = self.cached(url) {
            return Ok(connection);
        }

        let kind = select_transport(url)?;
        debug!(url = %url, transport = kind.label(), "Connecting to MCP hub");
        let client = tokio::time::timeout(self.call_timeout, self.connector.connect(url, kind))
            .await
            .map_err(|_| format!("Timed out connecting to MCP hub at {url}"))??;
        let connection = Arc::new(Connection {
            kind,
            client,
            connected_at: Utc::now(),
        });

        let replaced = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), connection.clone());
        if let Some(stale) = replaced {
            stale.client.close().await;
        }
        info!(url = %url, transport = kind.label(), "Connected to MCP hub");
        Ok(connection)
    }

    /// Drops the cached connection for `url` and connects again.
    pub async fn recover(&self, url: &str) -> Result<Arc<Connection>, String> {
        self.evict(url).await;
        self.get_connection(url).await
    }

    pub async fn evict(&self, url: &str) {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
        if let Some(connection) = removed {
            debug!(url = %url, "Evicted MCP hub connection");
            connection.client.close().await;
        }
    }

    /// Evicts one connection, or every connection when `url` is `None`.
    pub async fn reset(&self, url: Option<&str>) {
        match url {
            Some(url) => self.evict(url).await,
            None => {
                let drained: Vec<(String, Arc<Connection>)> = self
                    .connections
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .drain()
                    .collect();
                for (url, connection) in drained {
                    debug!(url = %url, "Evicted MCP hub connection");
                    connection.client.close().await;
                }
            }
        }
    }

    pub fn is_session_error(&self, message: &str) -> bool {
        let matched = (self.session_classifier)(message);
        if !matched {
            debug!(error = %message, "MCP error not classified as a session error");
        }
        matched
    }

    /// Runs `op` against a connection bounded by the call timeout.
    pub async fn timed<T, Fut>(&self, future: Fut) -> Result<T, String>
    where
        Fut: Future<Output = Result<T, String>>,
    {
        tokio::time::timeout(self.call_timeout, future)
            .await
            .unwrap_or_else(|_| {
                Err(format!(
                    "MCP request timed out after {}s",
                    self.call_timeout.as_secs()
                ))
            })
    }

    /// Runs `op` on the connection for `url`. A session error triggers one
    /// recovery and one retry; a second failure is returned as-is.
    pub async fn with_session_retry<T, F, Fut>(&self, url: &str, op: F) -> Result<T, String>
    where
        F: Fn(Arc<dyn HubConnection>) -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let connection = self.get_connection(url).await?;
        match self.timed(op(connection.client.clone())).await {
            Ok(value) => Ok(value),
            Err(err) if self.is_session_error(&err) => {
                info!(url = %url, error = %err, "MCP session expired; reconnecting");
                let connection = self.recover(url).await?;
                self.timed(op(connection.client.clone())).await
            }
            Err(err) => Err(err),
        }
    }

    /// Follows `nextCursor` until the hub stops paginating. Stops early on a
    /// cursor already seen, after [`MCP_MAX_TOOL_LIST`] pages, or once
    /// [`MCP_MAX_TOOL_LIST`] tools are collected.
    pub async fn list_all_tools(&self, url: &str) -> Result<Vec<ToolDescriptor>, String> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MCP_MAX_TOOL_LIST {
            let current = cursor.clone();
            let page = self
                .with_session_retry(url, |connection| {
                    let cursor = current.clone();
                    async move { connection.list_tools(cursor).await }
                })
                .await?;
            tools.extend(page.tools);

            if tools.len() >= MCP_MAX_TOOL_LIST {
                tools.truncate(MCP_MAX_TOOL_LIST);
                break;
            }
            match page.next_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!(url = %url, cursor = %next, "MCP hub repeated a tools/list cursor");
                    break;
                }
                None => break,
            }
        }

        Ok(tools)
    }
}

#[cfg(test)]
mod tests;
