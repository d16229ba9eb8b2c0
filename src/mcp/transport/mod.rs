//! Shared MCP transport abstractions.
//!
//! Implementations normalize protocol differences across streamable HTTP and
//! the legacy SSE transport so the client can drive either through one seam.

use async_trait::async_trait;
use reqwest::Url;
use rust_mcp_schema::schema_utils::{NotificationFromClient, RequestFromClient, ServerMessage};

pub mod sse;
pub mod streamable_http;

/// JSON-RPC code used by servers to indicate unsupported list methods.
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;

/// Supported MCP transport backends.
///
/// - [`TransportKind::StreamableHttp`] for hubs speaking streamable HTTP.
/// - [`TransportKind::Sse`] for hubs exposing the legacy SSE endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    StreamableHttp,
    Sse,
}

impl TransportKind {
    pub fn label(self) -> &'static str {
        match self {
            TransportKind::StreamableHttp => "streamable-http",
            TransportKind::Sse => "sse",
        }
    }
}

/// Chooses the transport from the hub URL: a path ending in `/sse` or
/// containing an `/sse` segment selects SSE, anything else streamable HTTP.
pub fn select_transport(url: &str) -> Result<TransportKind, String> {
    let parsed = Url::parse(url).map_err(|err| format!("Invalid MCP hub URL {url}: {err}"))?;
    let path = parsed.path();
    if path.ends_with("/sse") || path.contains("/sse/") {
        Ok(TransportKind::Sse)
    } else {
        Ok(TransportKind::StreamableHttp)
    }
}

#[async_trait]
/// Transport contract required by the MCP client.
pub trait McpTransport: Send + Sync {
    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String>;

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String>;

    /// Records the protocol version agreed during initialize.
    fn set_protocol_version(&self, _protocol_version: &str) {}

    fn is_open(&self) -> bool;

    async fn close(&self);
}

/// Returns true when a server reports the JSON-RPC method-not-found code.
pub fn is_method_not_found(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::Error(error) if error.error.code == MCP_METHOD_NOT_FOUND
    )
}
