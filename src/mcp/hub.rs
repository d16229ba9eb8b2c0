//! Single generic tool that forwards one of six actions to the hub.

use crate::core::envelope::{ToolOutput, ToolResult};
use crate::mcp::connection::{is_connection_error, ConnectionManager};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubAction {
    ListTools,
    CallTool,
    ListResources,
    ReadResource,
    ListPrompts,
    GetPrompt,
}

impl HubAction {
    pub const ALL: [HubAction; 6] = [
        HubAction::ListTools,
        HubAction::CallTool,
        HubAction::ListResources,
        HubAction::ReadResource,
        HubAction::ListPrompts,
        HubAction::GetPrompt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HubAction::ListTools => "list_tools",
            HubAction::CallTool => "call_tool",
            HubAction::ListResources => "list_resources",
            HubAction::ReadResource => "read_resource",
            HubAction::ListPrompts => "list_prompts",
            HubAction::GetPrompt => "get_prompt",
        }
    }
}

impl fmt::Display for HubAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HubAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        HubAction::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| format!("Unknown action: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubRequest {
    pub action: HubAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_parameters: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_arguments: Option<HashMap<String, String>>,
}

impl HubRequest {
    pub fn new(action: HubAction) -> Self {
        Self {
            action,
            tool_name: None,
            tool_parameters: None,
            resource_uri: None,
            prompt_name: None,
            prompt_arguments: None,
        }
    }
}

/// Operator-facing access to every hub capability through one entry point.
pub struct HubFacade {
    hub_url: Option<String>,
    connections: Arc<ConnectionManager>,
}

impl HubFacade {
    pub fn new(hub_url: Option<String>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            hub_url: hub_url.filter(|url| !url.trim().is_empty()),
            connections,
        }
    }

    /// Runs `request` and wraps the outcome. Never fails.
    pub async fn execute(&self, request: HubRequest) -> ToolResult {
        let action = request.action;
        let Some(url) = self.hub_url.as_deref() else {
            return failure(
                action,
                "MCP_HUB_URL environment variable is not configured".to_string(),
            );
        };

        match self.dispatch(url, request).await {
            Ok(result) => result.with_action(action.as_str()),
            Err(err) => {
                if is_connection_error(&err) {
                    debug!(url = %url, "Dropping cached MCP connection after error");
                    self.connections.evict(url).await;
                }
                warn!(action = %action, error = %err, "MCP hub action failed");
                failure(action, err)
            }
        }
    }

    async fn dispatch(&self, url: &str, request: HubRequest) -> Result<ToolResult, String> {
        let connections = &self.connections;
        match request.action {
            HubAction::ListTools => {
                let tools = connections.list_all_tools(url).await?;
                let listed: Vec<Value> = tools
                    .into_iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool
                                .description
                                .unwrap_or_else(|| "No description available".to_string()),
                            "inputSchema": if tool.input_schema.is_null() {
                                json!({})
                            } else {
                                tool.input_schema
                            },
                        })
                    })
                    .collect();
                Ok(
                    ToolResult::success(format!("Found {} available tools", listed.len()))
                        .with_result(Value::Array(listed)),
                )
            }
            HubAction::CallTool => {
                let tool_name = required(request.tool_name, "tool_name", request.action)?;
                let arguments = request.tool_parameters.unwrap_or_default();
                let name = tool_name.as_str();
                let outcome = connections
                    .with_session_retry(url, |connection| {
                        let arguments = arguments.clone();
                        async move { connection.call_tool(name, Some(arguments)).await }
                    })
                    .await?;
                let result = if outcome.is_error {
                    ToolResult::failure(
                        ToolOutput::from_content(outcome.content.clone())
                            .text()
                            .unwrap_or_else(|| "Tool reported an error".to_string()),
                        format!("Tool {tool_name} reported an error"),
                    )
                } else {
                    ToolResult::success(format!("Successfully executed tool: {tool_name}"))
                };
                Ok(result
                    .with_tool_name(tool_name.clone())
                    .with_result(Value::Array(outcome.content)))
            }
            HubAction::ListResources => {
                let listing = connections
                    .with_session_retry(url, |connection| async move {
                        connection.list_resources().await
                    })
                    .await?;
                let resources: Vec<Value> = listing
                    .resources
                    .into_iter()
                    .map(|resource| {
                        json!({
                            "uri": resource.uri,
                            "name": if resource.name.is_empty() {
                                "Unnamed resource".to_string()
                            } else {
                                resource.name
                            },
                            "description": resource
                                .description
                                .unwrap_or_else(|| "No description available".to_string()),
                            "mimeType": resource
                                .mime_type
                                .unwrap_or_else(|| "unknown".to_string()),
                        })
                    })
                    .collect();
                Ok(
                    ToolResult::success(format!("Found {} available resources", resources.len()))
                        .with_result(Value::Array(resources)),
                )
            }
            HubAction::ReadResource => {
                let uri = required(request.resource_uri, "resource_uri", request.action)?;
                let target = uri.as_str();
                let read = connections
                    .with_session_retry(url, |connection| async move {
                        connection.read_resource(target).await
                    })
                    .await?;
                let contents =
                    serde_json::to_value(&read.contents).map_err(|err| err.to_string())?;
                Ok(
                    ToolResult::success(format!("Successfully read resource: {uri}"))
                        .with_result(contents),
                )
            }
            HubAction::ListPrompts => {
                let listing = connections
                    .with_session_retry(url, |connection| async move {
                        connection.list_prompts().await
                    })
                    .await?;
                let mut prompts = Vec::with_capacity(listing.prompts.len());
                for prompt in listing.prompts {
                    let arguments =
                        serde_json::to_value(&prompt.arguments).map_err(|err| err.to_string())?;
                    prompts.push(json!({
                        "name": prompt.name,
                        "description": prompt
                            .description
                            .unwrap_or_else(|| "No description available".to_string()),
                        "arguments": if arguments.is_null() { json!([]) } else { arguments },
                    }));
                }
                Ok(
                    ToolResult::success(format!("Found {} available prompts", prompts.len()))
                        .with_result(Value::Array(prompts)),
                )
            }
            HubAction::GetPrompt => {
                let prompt_name = required(request.prompt_name, "prompt_name", request.action)?;
                let arguments = request.prompt_arguments;
                let name = prompt_name.as_str();
                let prompt = connections
                    .with_session_retry(url, |connection| {
                        let arguments = arguments.clone();
                        async move { connection.get_prompt(name, arguments).await }
                    })
                    .await?;
                let messages =
                    serde_json::to_value(&prompt.messages).map_err(|err| err.to_string())?;
                Ok(
                    ToolResult::success(format!("Successfully retrieved prompt: {prompt_name}"))
                        .with_result(messages),
                )
            }
        }
    }
}

fn required(value: Option<String>, field: &str, action: HubAction) -> Result<String, String> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| format!("{field} is required for {action} action"))
}

fn failure(action: HubAction, error: String) -> ToolResult {
    ToolResult::failure(error, format!("Failed to execute MCP hub action: {action}"))
        .with_action(action.as_str())
}
