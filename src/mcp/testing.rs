//! Scripted in-memory hub for exercising the registry and facade without a
//! network.

use crate::mcp::connection::{CallOutcome, Connector, HubConnection, ToolDescriptor, ToolPage};
use crate::mcp::transport::TransportKind;
use async_trait::async_trait;
use rust_mcp_schema::{GetPromptResult, ListPromptsResult, ListResourcesResult, ReadResourceResult};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAKE_HUB_URL: &str = "https://hub.example.com/mcp";

#[derive(Default)]
pub struct FakeHub {
    tools: Mutex<Vec<ToolDescriptor>>,
    replies: Mutex<HashMap<String, CallOutcome>>,
    failures: Mutex<VecDeque<String>>,
    page_size: Mutex<Option<usize>>,
    cursor_cycle: Mutex<Option<usize>>,
    connect_delay: Mutex<Duration>,
    unreachable: AtomicBool,
    pub connects: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub tool_calls: AtomicUsize,
    last_arguments: Mutex<Option<Map<String, Value>>>,
}

impl FakeHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tools(tools: Vec<ToolDescriptor>) -> Arc<Self> {
        let hub = Self::new();
        hub.set_tools(tools);
        hub
    }

    pub fn set_tools(&self, tools: Vec<ToolDescriptor>) {
        *self.tools.lock().expect("tools lock") = tools;
    }

    pub fn set_reply(&self, tool: &str, outcome: CallOutcome) {
        self.replies
            .lock()
            .expect("replies lock")
            .insert(tool.to_string(), outcome);
    }

    /// Queues an error returned by the next remote operation.
    pub fn fail_next(&self, error: &str) {
        self.failures
            .lock()
            .expect("failures lock")
            .push_back(error.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_page_size(&self, size: usize) {
        *self.page_size.lock().expect("page lock") = Some(size);
    }

    /// Serves empty pages whose cursors rotate through `len` values forever.
    pub fn set_cursor_cycle(&self, len: usize) {
        *self.cursor_cycle.lock().expect("cycle lock") = Some(len.max(1));
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().expect("delay lock") = delay;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }

    pub fn last_arguments(&self) -> Option<Map<String, Value>> {
        self.last_arguments.lock().expect("arguments lock").clone()
    }

    fn take_failure(&self) -> Result<(), String> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        match self.failures.lock().expect("failures lock").pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub fn descriptor(name: &str, input_schema: Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: Some(format!("{name} tool")),
        input_schema,
    }
}

pub fn echo_descriptor() -> ToolDescriptor {
    descriptor(
        "echo",
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }),
    )
}

pub struct FakeConnector {
    hub: Arc<FakeHub>,
}

impl FakeConnector {
    pub fn new(hub: Arc<FakeHub>) -> Arc<Self> {
        Arc::new(Self { hub })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _url: &str,
        _kind: TransportKind,
    ) -> Result<Arc<dyn HubConnection>, String> {
        let delay = *self.hub.connect_delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.hub.unreachable.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        self.hub.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            hub: self.hub.clone(),
            live: AtomicBool::new(true),
        }))
    }
}

pub struct FakeConnection {
    hub: Arc<FakeHub>,
    live: AtomicBool,
}

#[async_trait]
impl HubConnection for FakeConnection {
    fn is_connected(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn list_tools(&self, cursor: Option<String>) -> Result<ToolPage, String> {
        let call = self.hub.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.hub.take_failure()?;
        if let Some(len) = *self.hub.cursor_cycle.lock().expect("cycle lock") {
            return Ok(ToolPage {
                tools: Vec::new(),
                next_cursor: Some(format!("cursor-{}", call % len)),
            });
        }
        let tools = self.hub.tools.lock().expect("tools lock").clone();
        let page_size = *self.hub.page_size.lock().expect("page lock");
        let Some(size) = page_size else {
            return Ok(ToolPage {
                tools,
                next_cursor: None,
            });
        };
        let start = cursor
            .and_then(|cursor| cursor.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + size).min(tools.len());
        Ok(ToolPage {
            tools: tools.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
            next_cursor: (end < tools.len()).then(|| end.to_string()),
        })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallOutcome, String> {
        self.hub.tool_calls.fetch_add(1, Ordering::SeqCst);
        self.hub.take_failure()?;
        *self.hub.last_arguments.lock().expect("arguments lock") = arguments.clone();
        if let Some(outcome) = self.hub.replies.lock().expect("replies lock").get(name) {
            return Ok(outcome.clone());
        }
        let known = self
            .hub
            .tools
            .lock()
            .expect("tools lock")
            .iter()
            .any(|tool| tool.name == name);
        if !known {
            return Err(format!("MCP error -32602: Unknown tool: {name}"));
        }
        let text = arguments
            .as_ref()
            .and_then(|arguments| arguments.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(arguments.unwrap_or_default()).to_string());
        Ok(CallOutcome::text(text))
    }

    async fn list_resources(&self) -> Result<ListResourcesResult, String> {
        self.hub.take_failure()?;
        serde_json::from_value(json!({
            "resources": [
                { "uri": "file:///notes.txt", "name": "notes", "mimeType": "text/plain" },
                { "uri": "file:///raw.bin", "name": "raw" }
            ]
        }))
        .map_err(|err| err.to_string())
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, String> {
        self.hub.take_failure()?;
        serde_json::from_value(json!({
            "contents": [{ "uri": uri, "mimeType": "text/plain", "text": "hello" }]
        }))
        .map_err(|err| err.to_string())
    }

    async fn list_prompts(&self) -> Result<ListPromptsResult, String> {
        self.hub.take_failure()?;
        serde_json::from_value(json!({
            "prompts": [
                { "name": "summarize", "arguments": [{ "name": "topic", "required": true }] },
                { "name": "greet" }
            ]
        }))
        .map_err(|err| err.to_string())
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult, String> {
        self.hub.take_failure()?;
        let topic = arguments
            .and_then(|arguments| arguments.get("topic").cloned())
            .unwrap_or_default();
        serde_json::from_value(json!({
            "messages": [{
                "role": "user",
                "content": { "type": "text", "text": format!("{name}: {topic}") }
            }]
        }))
        .map_err(|err| err.to_string())
    }

    async fn close(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}
