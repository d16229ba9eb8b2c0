//! MCP client session over one transport.
//!
//! [`McpClient::connect`] opens the transport, runs the initialize handshake,
//! and records the hub's capabilities. List calls for capabilities the hub
//! did not advertise, or that it answers with method-not-found, return empty
//! results instead of errors.

use crate::mcp::connection::{CallOutcome, HubConnection, ToolPage};
use crate::mcp::transport::sse::SseTransport;
use crate::mcp::transport::streamable_http::StreamableHttpTransport;
use crate::mcp::transport::{self, McpTransport, TransportKind};
use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{NotificationFromClient, RequestFromClient, ServerMessage};
use rust_mcp_schema::{
    CallToolRequestParams, ClientCapabilities, GetPromptRequestParams, GetPromptResult,
    Implementation, InitializeRequestParams, InitializeResult, ListPromptsResult,
    ListResourcesResult, ReadResourceRequestParams, ReadResourceResult, ServerCapabilities,
    LATEST_PROTOCOL_VERSION,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

mod protocol;

pub struct McpClient {
    url: String,
    kind: TransportKind,
    transport: Box<dyn McpTransport>,
    server_details: InitializeResult,
}

impl McpClient {
    /// Opens a transport of `kind` to `url` and completes the handshake.
    pub async fn connect(
        http: reqwest::Client,
        url: &str,
        kind: TransportKind,
        request_timeout: Duration,
    ) -> Result<Self, String> {
        let transport: Box<dyn McpTransport> = match kind {
            TransportKind::StreamableHttp => Box::new(StreamableHttpTransport::new(http, url)),
            TransportKind::Sse => {
                Box::new(SseTransport::connect(http, url, request_timeout).await?)
            }
        };
        Self::initialize(url, kind, transport).await
    }

    /// Runs the initialize handshake over an already-open transport.
    pub async fn initialize(
        url: &str,
        kind: TransportKind,
        transport: Box<dyn McpTransport>,
    ) -> Result<Self, String> {
        let response = transport
            .send_request(RequestFromClient::InitializeRequest(client_details()))
            .await?;
        let server_details = protocol::parse_initialize_result(response)?;
        transport.set_protocol_version(&server_details.protocol_version);
        transport
            .send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        debug!(
            url = %url,
            transport = kind.label(),
            server = %server_details.server_info.name,
            protocol_version = %server_details.protocol_version,
            "MCP session initialized"
        );

        Ok(Self {
            url: url.to_string(),
            kind,
            transport,
            server_details,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    pub fn server_details(&self) -> &InitializeResult {
        &self.server_details
    }

    fn server_capabilities(&self) -> &ServerCapabilities {
        &self.server_details.capabilities
    }

    fn supports_tools(&self) -> bool {
        self.server_capabilities().tools.is_some()
    }

    fn supports_resources(&self) -> bool {
        self.server_capabilities().resources.is_some()
    }

    fn supports_prompts(&self) -> bool {
        self.server_capabilities().prompts.is_some()
    }

    /// Sends a list request, mapping method-not-found to `None`.
    async fn list_request(
        &self,
        request: RequestFromClient,
    ) -> Result<Option<ServerMessage>, String> {
        let response = self.transport.send_request(request).await?;
        if transport::is_method_not_found(&response) {
            debug!(url = %self.url, "MCP hub does not implement list method");
            return Ok(None);
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl HubConnection for McpClient {
    fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    async fn list_tools(&self, cursor: Option<String>) -> Result<ToolPage, String> {
        if !self.supports_tools() {
            return Ok(ToolPage::default());
        }
        let request = RequestFromClient::ListToolsRequest(protocol::paginated_params(cursor));
        match self.list_request(request).await? {
            Some(response) => protocol::parse_tool_page(response),
            None => Ok(ToolPage::default()),
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallOutcome, String> {
        let mut params = CallToolRequestParams::new(name);
        if let Some(arguments) = arguments {
            params = params.with_arguments(arguments);
        }
        let response = self
            .transport
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        protocol::parse_call_outcome(response)
    }

    async fn list_resources(&self) -> Result<ListResourcesResult, String> {
        if !self.supports_resources() {
            return Ok(empty_list_resources());
        }
        let request = RequestFromClient::ListResourcesRequest(None);
        match self.list_request(request).await? {
            Some(response) => protocol::parse_list_resources(response),
            None => Ok(empty_list_resources()),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, String> {
        let params = ReadResourceRequestParams {
            meta: None,
            uri: uri.to_string(),
        };
        let response = self
            .transport
            .send_request(RequestFromClient::ReadResourceRequest(params))
            .await?;
        protocol::parse_read_resource(response)
    }

    async fn list_prompts(&self) -> Result<ListPromptsResult, String> {
        if !self.supports_prompts() {
            return Ok(empty_list_prompts());
        }
        let request = RequestFromClient::ListPromptsRequest(None);
        match self.list_request(request).await? {
            Some(response) => protocol::parse_list_prompts(response),
            None => Ok(empty_list_prompts()),
        }
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult, String> {
        let params = GetPromptRequestParams {
            name: name.to_string(),
            arguments: arguments.filter(|arguments| !arguments.is_empty()),
            meta: None,
        };
        let response = self
            .transport
            .send_request(RequestFromClient::GetPromptRequest(params))
            .await?;
        protocol::parse_get_prompt(response)
    }

    async fn close(&self) {
        self.transport.close().await;
    }
}

fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "hubtools".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("hubtools MCP hub client".to_string()),
            description: Some("Dynamic MCP tool discovery and caching".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

fn empty_list_resources() -> ListResourcesResult {
    ListResourcesResult {
        meta: None,
        next_cursor: None,
        resources: Vec::new(),
    }
}

fn empty_list_prompts() -> ListPromptsResult {
    ListPromptsResult {
        meta: None,
        next_cursor: None,
        prompts: Vec::new(),
    }
}
