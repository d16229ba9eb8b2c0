//! Legacy HTTP+SSE transport.
//!
//! The client holds a GET event stream open. The hub first sends an
//! `endpoint` event naming the URL that accepts POSTed messages. Replies to
//! those POSTs arrive later on the stream as `message` events and are routed
//! back to the waiting request by id.

use super::streamable_http::{
    apply_client_post_headers, apply_protocol_version_header, decode_sse_line, http_status_error,
    is_event_stream_content_type, sse_data_payload, sse_event_name, SseLineBuffer,
};
use super::McpTransport;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Url;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::RequestId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

type PendingReplies = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;

fn lock_pending(
    pending: &PendingReplies,
) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<ServerMessage>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a request's reply slot however its wait ends, including when the
/// caller drops the future.
struct PendingEntry<'a> {
    pending: &'a PendingReplies,
    id: RequestId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

pub struct SseTransport {
    client: reqwest::Client,
    endpoint: Url,
    pending: PendingReplies,
    next_request_id: AtomicI64,
    open: Arc<AtomicBool>,
    protocol_version: Mutex<Option<String>>,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Opens the event stream and waits for the hub to announce its message
    /// endpoint. `client` must not carry a total request timeout, or the
    /// stream is cut once it elapses.
    pub async fn connect(
        client: reqwest::Client,
        url: &str,
        request_timeout: Duration,
    ) -> Result<Self, String> {
        let base = Url::parse(url).map_err(|err| format!("Invalid MCP hub URL {url}: {err}"))?;
        debug!(url = %url, "Opening MCP SSE stream");
        let opened = client
            .get(base.clone())
            .header("Accept", "text/event-stream")
            .send();
        let response = tokio::time::timeout(request_timeout, opened)
            .await
            .map_err(|_| "MCP SSE connection timed out opening the stream.".to_string())?
            .map_err(|err| format!("MCP transport error: {err}"))?;
        if !response.status().is_success() {
            return Err(http_status_error(response).await);
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !is_event_stream_content_type(content_type) {
            return Err(format!(
                "MCP transport error: expected an event stream, got {content_type:?}"
            ));
        }

        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let open = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_event_stream(
            response,
            base,
            endpoint_tx,
            pending.clone(),
            open.clone(),
        ));

        let endpoint = match tokio::time::timeout(request_timeout, endpoint_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(err))) => {
                reader.abort();
                return Err(err);
            }
            Ok(Err(_)) => {
                reader.abort();
                return Err("MCP SSE stream closed before announcing an endpoint.".to_string());
            }
            Err(_) => {
                reader.abort();
                return Err("MCP SSE connection timed out waiting for endpoint.".to_string());
            }
        };
        debug!(url = %url, endpoint = %endpoint, "MCP SSE endpoint announced");

        Ok(Self {
            client,
            endpoint,
            pending,
            next_request_id: AtomicI64::new(0),
            open,
            protocol_version: Mutex::new(None),
            request_timeout,
            reader,
        })
    }

    async fn post(&self, message: &ClientMessage) -> Result<(), String> {
        if !self.is_open() {
            return Err("MCP SSE stream closed.".to_string());
        }
        let payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
        let protocol_version = self
            .protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let response = apply_protocol_version_header(
            apply_client_post_headers(self.client.post(self.endpoint.clone())),
            protocol_version.as_deref(),
        )
        .timeout(self.request_timeout)
        .body(payload)
        .send()
        .await
        .map_err(|err| format!("MCP transport error: {err}"))?;
        if !response.status().is_success() {
            return Err(http_status_error(response).await);
        }
        Ok(())
    }
}

async fn read_event_stream(
    response: reqwest::Response,
    base: Url,
    endpoint_tx: oneshot::Sender<Result<Url, String>>,
    pending: PendingReplies,
    open: Arc<AtomicBool>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut stream = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();
    // Blank separator lines are dropped by the buffer, so an event name
    // applies to the data line that follows it.
    let mut event = MESSAGE_EVENT.to_string();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(error = %err, "MCP SSE stream failed");
                break;
            }
        };
        for line in buffer.push(&chunk) {
            handle_line(&line, &mut event, &base, &mut endpoint_tx, &pending);
        }
    }
    for line in buffer.finish() {
        handle_line(&line, &mut event, &base, &mut endpoint_tx, &pending);
    }

    debug!("MCP SSE stream ended");
    open.store(false, Ordering::SeqCst);
    lock_pending(&pending).clear();
}

fn handle_line(
    line: &str,
    event: &mut String,
    base: &Url,
    endpoint_tx: &mut Option<oneshot::Sender<Result<Url, String>>>,
    pending: &PendingReplies,
) {
    if let Some(name) = sse_event_name(line) {
        *event = name.to_string();
        return;
    }
    let Some(data) = sse_data_payload(line) else {
        return;
    };
    let current = std::mem::replace(event, MESSAGE_EVENT.to_string());

    if current == ENDPOINT_EVENT {
        if let Some(tx) = endpoint_tx.take() {
            let resolved = base
                .join(data)
                .map_err(|err| format!("Invalid MCP SSE endpoint {data}: {err}"));
            let _ = tx.send(resolved);
        }
        return;
    }

    match decode_sse_line(line) {
        Ok(Some(message)) => dispatch_message(pending, message),
        Ok(None) => {}
        Err(err) => debug!(error = %err, "Skipping undecodable MCP SSE message"),
    }
}

fn dispatch_message(pending: &PendingReplies, message: ServerMessage) {
    let id = match &message {
        ServerMessage::Response(response) => Some(response.id.clone()),
        ServerMessage::Error(error) => error.id.clone(),
        ServerMessage::Request(_) | ServerMessage::Notification(_) => {
            debug!("Ignoring MCP SSE server-initiated message");
            None
        }
    };
    if let Some(id) = id {
        let waiting = lock_pending(pending).remove(&id);
        if let Some(tx) = waiting {
            let _ = tx.send(message);
        }
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(&self, request: RequestFromClient) -> Result<ServerMessage, String> {
        let request_id =
            RequestId::Integer(self.next_request_id.fetch_add(1, Ordering::SeqCst));
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| err.to_string())?;

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(request_id.clone(), tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            id: request_id,
        };

        self.post(&message).await?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err("MCP SSE stream closed.".to_string()),
            Err(_) => Err("MCP SSE request timed out.".to_string()),
        }
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        self.post(&message).await
    }

    fn set_protocol_version(&self, protocol_version: &str) {
        *self
            .protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(protocol_version.to_string());
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.reader.abort();
        lock_pending(&self.pending).clear();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
