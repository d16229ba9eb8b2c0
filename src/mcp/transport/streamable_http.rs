use super::McpTransport;
use async_trait::async_trait;
use futures_util::StreamExt;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::RequestId;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub const MCP_JSON_CONTENT_TYPE: &str = "application/json";
pub const MCP_JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Splits a byte stream into trimmed, non-empty SSE lines.
#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = self.buffer[search_index..].iter().position(|b| *b == b'\n')
        {
            let newline_index = search_index + relative_pos;
            let mut line_end = newline_index;
            if line_end > search_index && self.buffer[line_end - 1] == b'\r' {
                line_end -= 1;
            }

            push_trimmed(&mut lines, &self.buffer[search_index..line_end]);
            search_index = newline_index + 1;
        }

        if flush {
            push_trimmed(&mut lines, &self.buffer[search_index..]);
            self.buffer.clear();
        } else if search_index > 0 {
            self.buffer.drain(..search_index);
        }

        lines
    }
}

fn push_trimmed(lines: &mut Vec<String>, bytes: &[u8]) {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

pub fn sse_event_name(line: &str) -> Option<&str> {
    line.strip_prefix("event:").map(str::trim)
}

/// Reads an event-stream response until the first JSON-RPC response or error.
pub async fn next_sse_server_message(response: reqwest::Response) -> Result<ServerMessage, String> {
    let mut stream = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| err.to_string())?;
        for line in buffer.push(&chunk) {
            if let Some(message) = decode_reply_line(&line)? {
                return Ok(message);
            }
        }
    }

    for line in buffer.finish() {
        if let Some(message) = decode_reply_line(&line)? {
            return Ok(message);
        }
    }

    Err("Empty event-stream response.".to_string())
}

fn decode_reply_line(line: &str) -> Result<Option<ServerMessage>, String> {
    match decode_sse_line(line)? {
        Some(message @ (ServerMessage::Response(_) | ServerMessage::Error(_))) => Ok(Some(message)),
        Some(other) => {
            debug!(message = ?other, "Ignoring MCP server message while awaiting reply");
            Ok(None)
        }
        None => Ok(None),
    }
}

pub(crate) fn decode_sse_line(line: &str) -> Result<Option<ServerMessage>, String> {
    let Some(payload) = sse_data_payload(line) else {
        return Ok(None);
    };

    if payload.is_empty() {
        return Ok(None);
    }

    serde_json::from_str::<ServerMessage>(payload)
        .map(Some)
        .map_err(|err| err.to_string())
}

pub fn apply_client_post_headers(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    request
        .header("Content-Type", MCP_JSON_CONTENT_TYPE)
        .header("Accept", MCP_JSON_AND_SSE_ACCEPT)
}

pub fn apply_protocol_version_header(
    request: reqwest::RequestBuilder,
    protocol_version: Option<&str>,
) -> reqwest::RequestBuilder {
    match protocol_version {
        Some(protocol_version) if !protocol_version.trim().is_empty() => {
            request.header(MCP_PROTOCOL_VERSION_HEADER, protocol_version)
        }
        _ => request,
    }
}

/// Turns a non-success HTTP reply into an error carrying status and body, so
/// callers can classify hub-side session failures.
pub(crate) async fn http_status_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    }
}

/// Streamable HTTP transport: every message is a POST to the hub URL, and
/// replies arrive as JSON or as an event stream.
pub struct StreamableHttpTransport {
    client: reqwest::Client,
    url: String,
    session_id: Mutex<Option<String>>,
    protocol_version: Mutex<Option<String>>,
    next_request_id: AtomicI64,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            session_id: Mutex::new(None),
            protocol_version: Mutex::new(None),
            next_request_id: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session_id(&self, session_id: String) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session_id);
    }

    fn protocol_version(&self) -> Option<String> {
        self.protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn post(&self, payload: String) -> reqwest::RequestBuilder {
        let mut request = apply_protocol_version_header(
            apply_client_post_headers(self.client.post(&self.url)),
            self.protocol_version().as_deref(),
        )
        .body(payload);
        if let Some(session_id) = self.session_id() {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }
        request
    }

    fn capture_session_id(&self, response: &reqwest::Response) {
        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.set_session_id(session_id.to_string());
        }
    }

    async fn send_message(&self, message: ClientMessage) -> Result<ServerMessage, String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err("MCP transport closed.".to_string());
        }
        let payload = serde_json::to_string(&message).map_err(|err| err.to_string())?;
        debug!(url = %self.url, "Sending MCP HTTP request");

        let response = self
            .post(payload)
            .send()
            .await
            .map_err(|err| format!("MCP transport error: {err}"))?;
        if !response.status().is_success() {
            return Err(http_status_error(response).await);
        }
        self.capture_session_id(&response);

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if is_event_stream_content_type(&content_type) {
            next_sse_server_message(response).await
        } else {
            let body = response.bytes().await.map_err(|err| err.to_string())?;
            serde_json::from_slice::<ServerMessage>(&body).map_err(|err| err.to_string())
        }
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(RequestId::Integer(request_id)),
        )
        .map_err(|err| err.to_string())?;
        self.send_message(message).await
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        let payload = serde_json::to_string(&message).map_err(|err| err.to_string())?;
        let response = self
            .post(payload)
            .send()
            .await
            .map_err(|err| format!("MCP transport error: {err}"))?;
        if !response.status().is_success() {
            return Err(http_status_error(response).await);
        }
        self.capture_session_id(&response);
        Ok(())
    }

    fn set_protocol_version(&self, protocol_version: &str) {
        *self
            .protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(protocol_version.to_string());
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Best effort: tell the hub the session is over.
        if let Some(session_id) = self.session_id() {
            let result = self
                .client
                .delete(&self.url)
                .header(MCP_SESSION_ID_HEADER, session_id)
                .send()
                .await;
            if let Err(err) = result {
                debug!(url = %self.url, error = %err, "MCP session termination failed");
            }
        }
    }
}
