//! Cached registry of hub tools exposed as locally callable tools.
//!
//! Discovery lists the hub's tools, converts each parameter schema, and swaps
//! a new [`RegistrySnapshot`] in behind an `Arc`. Readers get the cached
//! snapshot until the TTL lapses; a failed rediscovery keeps serving the
//! previous snapshot.

use crate::core::clock::Clock;
use crate::core::config::HubConfig;
use crate::core::envelope::{ToolOutput, ToolResult};
use crate::mcp::connection::{ConnectionManager, ToolDescriptor};
pub use crate::mcp::connection::MCP_MAX_TOOL_LIST;
use crate::schema::{self, ConvertOptions, ParameterSchema, SchemaHealth, COMPAT_FIELD};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DESCRIPTION_MARKER: &str = "[MCP]";

/// A hub tool bound to the connection that discovered it.
pub struct CallableTool {
    pub name: String,
    pub remote_name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    pub health: SchemaHealth,
    hub_url: String,
    connections: Arc<ConnectionManager>,
}

impl CallableTool {
    /// JSON Schema handed to the tool-calling provider.
    pub fn input_schema(&self) -> Value {
        self.parameters.to_json_schema()
    }

    /// Validates `arguments`, calls the remote tool, and wraps the outcome.
    /// Never fails: every error becomes a `success: false` envelope.
    pub async fn execute(&self, arguments: Value) -> ToolResult {
        let arguments = if arguments.is_null() {
            Value::Object(Map::new())
        } else {
            arguments
        };
        let mut arguments = match self.parameters.parse(&arguments) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(violation) => {
                debug!(tool = %self.name, error = %violation, "Rejected MCP tool arguments");
                return ToolResult::tool_failure(
                    &self.remote_name,
                    format!("Invalid arguments: {violation}"),
                );
            }
        };
        arguments.remove(COMPAT_FIELD);

        let remote_name = self.remote_name.as_str();
        let outcome = self
            .connections
            .with_session_retry(&self.hub_url, |connection| {
                let arguments = arguments.clone();
                async move { connection.call_tool(remote_name, Some(arguments)).await }
            })
            .await;

        match outcome {
            Ok(outcome) => {
                let output = ToolOutput::from_content(outcome.content);
                if outcome.is_error {
                    let error = output
                        .text()
                        .unwrap_or_else(|| "Tool reported an error".to_string());
                    ToolResult::tool_failure(&self.remote_name, error)
                } else {
                    ToolResult::from_tool_output(&self.remote_name, output)
                }
            }
            Err(err) => {
                warn!(tool = %self.name, error = %err, "MCP tool call failed");
                ToolResult::tool_failure(&self.remote_name, err)
            }
        }
    }
}

impl std::fmt::Debug for CallableTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableTool")
            .field("name", &self.name)
            .field("remote_name", &self.remote_name)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct RegistrySnapshot {
    pub tools: BTreeMap<String, Arc<CallableTool>>,
    pub discovered_at: Instant,
}

impl RegistrySnapshot {
    fn empty(discovered_at: Instant) -> Self {
        Self {
            tools: BTreeMap::new(),
            discovered_at,
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CallableTool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub tools_count: usize,
    pub age: Option<Duration>,
    pub fresh: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicTool {
    pub name: String,
    pub health: &'static str,
    pub openai: bool,
    pub anthropic: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    pub total_tools: usize,
    pub compatible_with_openai: usize,
    pub compatible_with_anthropic: usize,
    pub problematic_tools: Vec<ProblematicTool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
    pub success: bool,
    pub tools_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<CompatibilityReport>,
}

struct AutoRefresh {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ToolRegistry {
    hub_url: Option<String>,
    ttl: Duration,
    tool_prefix: String,
    convert_options: ConvertOptions,
    connections: Arc<ConnectionManager>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Option<Arc<RegistrySnapshot>>>,
    discovery: Mutex<()>,
    last_error: StdMutex<Option<String>>,
    auto_refresh: StdMutex<Option<AutoRefresh>>,
}

impl ToolRegistry {
    pub fn new(
        config: &HubConfig,
        connections: Arc<ConnectionManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hub_url: config.hub_url().map(str::to_string),
            ttl: config.cache_ttl(),
            tool_prefix: config.tool_prefix.clone(),
            convert_options: config.convert_options(),
            connections,
            clock,
            snapshot: RwLock::new(None),
            discovery: Mutex::new(()),
            last_error: StdMutex::new(None),
            auto_refresh: StdMutex::new(None),
        }
    }

    pub fn hub_url(&self) -> Option<&str> {
        self.hub_url.as_deref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Error from the most recent discovery, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_outcome(&self, error: Option<&str>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error.map(str::to_string);
    }

    fn current(&self) -> Option<Arc<RegistrySnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_fresh(&self, snapshot: &RegistrySnapshot) -> bool {
        self.clock
            .now()
            .saturating_duration_since(snapshot.discovered_at)
            < self.ttl
    }

    fn fresh_snapshot(&self) -> Option<Arc<RegistrySnapshot>> {
        self.current().filter(|snapshot| self.is_fresh(snapshot))
    }

    /// Returns the cached tools, rediscovering once the TTL has lapsed.
    pub async fn get_tools(&self) -> Arc<RegistrySnapshot> {
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }

        let _guard = self.discovery.lock().await;
        // Another caller may have finished discovery while we waited.
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }

        match self.discover_locked().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "MCP tool discovery failed");
                match self.current() {
                    Some(previous) => {
                        info!(
                            tools = previous.len(),
                            "Serving previous MCP tool snapshot after failed discovery"
                        );
                        previous
                    }
                    None => Arc::new(RegistrySnapshot::empty(self.clock.now())),
                }
            }
        }
    }

    /// Runs discovery now, regardless of cache state.
    pub async fn discover(&self) -> Result<Arc<RegistrySnapshot>, String> {
        let _guard = self.discovery.lock().await;
        self.discover_locked().await
    }

    async fn discover_locked(&self) -> Result<Arc<RegistrySnapshot>, String> {
        let Some(url) = self.hub_url.as_deref() else {
            debug!("No MCP hub URL configured; skipping tool discovery");
            return Ok(Arc::new(RegistrySnapshot::empty(self.clock.now())));
        };

        let started = self.clock.now();
        info!(url = %url, "Discovering MCP tools");
        let descriptors = match self.connections.list_all_tools(url).await {
            Ok(descriptors) => descriptors,
            Err(err) => {
                self.record_outcome(Some(&err));
                return Err(err);
            }
        };

        let mut tools = BTreeMap::new();
        for descriptor in descriptors {
            if descriptor.name.trim().is_empty() {
                warn!("Skipping MCP tool without a name");
                continue;
            }
            let built = catch_unwind(AssertUnwindSafe(|| self.build_tool(url, &descriptor)));
            match built {
                Ok(tool) => {
                    debug!(tool = %tool.name, health = tool.health.label(), "Registered MCP tool");
                    tools.insert(tool.name.clone(), Arc::new(tool));
                }
                Err(_) => {
                    warn!(tool = %descriptor.name, "Skipping MCP tool whose schema could not be processed");
                }
            }
        }

        let snapshot = Arc::new(RegistrySnapshot {
            tools,
            discovered_at: started,
        });
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        self.record_outcome(None);
        info!(url = %url, tools = snapshot.len(), "MCP tool discovery complete");
        Ok(snapshot)
    }

    fn build_tool(&self, url: &str, descriptor: &ToolDescriptor) -> CallableTool {
        let raw_schema = if descriptor.input_schema.is_object() {
            descriptor.input_schema.clone()
        } else {
            json!({ "type": "object" })
        };
        let parameters = schema::convert_with(&raw_schema, self.convert_options);
        let health = schema::self_check(&parameters);
        if health.is_degraded() {
            warn!(
                tool = %descriptor.name,
                "MCP tool schema rejects minimal arguments; registering anyway"
            );
        }

        let description = match descriptor.description.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => format!("{DESCRIPTION_MARKER} {text}"),
            _ => format!("{DESCRIPTION_MARKER} Tool from MCP: {}", descriptor.name),
        };

        CallableTool {
            name: format!("{}{}", self.tool_prefix, descriptor.name),
            remote_name: descriptor.name.clone(),
            description,
            parameters,
            health,
            hub_url: url.to_string(),
            connections: self.connections.clone(),
        }
    }

    /// Drops the cached snapshot. Idempotent.
    pub fn invalidate(&self) {
        let cleared = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if cleared.is_some() {
            debug!("MCP tool cache invalidated");
        }
    }

    /// Drops the snapshot and every cached hub connection.
    pub async fn force_reset(&self) {
        self.invalidate();
        self.connections.reset(None).await;
        info!("MCP registry and connections reset");
    }

    pub fn snapshot_info(&self) -> SnapshotInfo {
        match self.current() {
            Some(snapshot) => SnapshotInfo {
                tools_count: snapshot.len(),
                age: Some(
                    self.clock
                        .now()
                        .saturating_duration_since(snapshot.discovered_at),
                ),
                fresh: self.is_fresh(&snapshot),
            },
            None => SnapshotInfo {
                tools_count: 0,
                age: None,
                fresh: false,
            },
        }
    }

    /// Starts a background task that rediscovers once per TTL. Returns false
    /// when a refresh task is already running.
    pub fn start_auto_refresh(self: &Arc<Self>) -> bool {
        let mut slot = self
            .auto_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }

        let period = self.ttl.max(Duration::from_millis(1));
        let registry: Weak<Self> = Arc::downgrade(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        debug!("Auto-refreshing MCP tools");
                        registry.invalidate();
                        if let Err(err) = registry.discover().await {
                            warn!(error = %err, "MCP auto-refresh failed");
                        }
                    }
                }
            }
        });

        *slot = Some(AutoRefresh { cancel, handle });
        info!(period_ms = period.as_millis() as u64, "MCP auto-refresh started");
        true
    }

    /// Stops the background refresh. Returns false when none was running.
    pub fn stop_auto_refresh(&self) -> bool {
        let stopped = self
            .auto_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match stopped {
            Some(refresh) => {
                refresh.cancel.cancel();
                refresh.handle.abort();
                info!("MCP auto-refresh stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.auto_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs a fresh discovery and reports the outcome.
    pub async fn test_connection(&self) -> ConnectionTest {
        if self.hub_url.is_none() {
            return ConnectionTest {
                success: false,
                tools_count: 0,
                error: Some("MCP_HUB_URL is not configured".to_string()),
                compatibility: None,
            };
        }
        match self.discover().await {
            Ok(snapshot) => ConnectionTest {
                success: true,
                tools_count: snapshot.len(),
                error: None,
                compatibility: Some(compatibility_of(&snapshot)),
            },
            Err(err) => ConnectionTest {
                success: false,
                tools_count: 0,
                error: Some(err),
                compatibility: None,
            },
        }
    }

    /// Flags tools whose parameter schemas some providers are known to reject.
    pub async fn compatibility_report(&self) -> CompatibilityReport {
        let snapshot = self.get_tools().await;
        compatibility_of(&snapshot)
    }
}

impl Drop for ToolRegistry {
    fn drop(&mut self) {
        let refresh = self
            .auto_refresh
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(refresh) = refresh {
            refresh.cancel.cancel();
            refresh.handle.abort();
        }
    }
}

fn compatibility_of(snapshot: &RegistrySnapshot) -> CompatibilityReport {
    let mut report = CompatibilityReport {
        total_tools: snapshot.len(),
        ..CompatibilityReport::default()
    };

    for tool in snapshot.tools.values() {
        let emitted = tool.input_schema();
        let mut issues = Vec::new();
        let mut openai = false;
        let mut anthropic = false;

        if tool.health.is_degraded() {
            issues.push("schema rejects empty, compatibility and placeholder arguments".to_string());
            openai = true;
            anthropic = true;
        }
        if let Err(err) = jsonschema::validator_for(&emitted) {
            issues.push(format!("emitted JSON schema is invalid: {err}"));
            openai = true;
            anthropic = true;
        }
        if emitted.get("type").and_then(Value::as_str) != Some("object") {
            issues.push("schema root is not an object".to_string());
            openai = true;
        } else if is_closed_empty_object(&emitted) {
            issues.push("object schema has no properties and forbids additional ones".to_string());
            openai = true;
        }

        if !openai {
            report.compatible_with_openai += 1;
        }
        if !anthropic {
            report.compatible_with_anthropic += 1;
        }
        if openai || anthropic {
            report.problematic_tools.push(ProblematicTool {
                name: tool.name.clone(),
                health: tool.health.label(),
                openai,
                anthropic,
                issues,
            });
        }
    }

    report
}

fn is_closed_empty_object(schema: &Value) -> bool {
    let no_properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .is_none_or(Map::is_empty);
    let additional = schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    no_properties && !additional
}
