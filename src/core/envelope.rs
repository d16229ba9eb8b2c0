//! Result envelope shared by every callable tool and hub action.
//!
//! The tool-calling layer formats tool output based on this exact shape, so
//! field names and omission rules must stay stable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Value>>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Remote tool output, resolved once when a call result is normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Structured(Vec<Value>),
    Empty,
}

impl ToolOutput {
    /// A lone text block becomes plain text; anything else is kept verbatim.
    pub fn from_content(content: Vec<Value>) -> Self {
        match content.as_slice() {
            [] => ToolOutput::Empty,
            [single] if single.get("type").and_then(Value::as_str) == Some("text") => {
                match single.get("text").and_then(Value::as_str) {
                    Some(text) => ToolOutput::Text(text.to_string()),
                    None => ToolOutput::Structured(content),
                }
            }
            _ => ToolOutput::Structured(content),
        }
    }

    /// Concatenated text blocks, used for error reporting.
    pub fn text(&self) -> Option<String> {
        match self {
            ToolOutput::Text(text) => Some(text.clone()),
            ToolOutput::Structured(blocks) => {
                let texts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|block| block.get("text").and_then(Value::as_str))
                    .collect();
                (!texts.is_empty()).then(|| texts.join("\n"))
            }
            ToolOutput::Empty => None,
        }
    }
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            action: None,
            result: None,
            content: None,
            message: message.into(),
            error: None,
            tool_name: None,
        }
    }

    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            action: None,
            result: None,
            content: None,
            message: message.into(),
            error: Some(error.into()),
            tool_name: None,
        }
    }

    /// Envelope for a completed remote tool call.
    pub fn from_tool_output(tool_name: &str, output: ToolOutput) -> Self {
        let message = format!("Successfully executed MCP tool: {tool_name}");
        match output {
            ToolOutput::Text(text) => Self::success(message).with_result(Value::String(text)),
            ToolOutput::Structured(blocks) => Self {
                content: Some(blocks),
                ..Self::success(message)
            },
            ToolOutput::Empty => Self::success(message).with_result(Value::String(format!(
                "Tool {tool_name} executed successfully"
            ))),
        }
    }

    /// Envelope for a remote tool call that failed for any reason.
    pub fn tool_failure(tool_name: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            tool_name: Some(tool_name.to_string()),
            ..Self::failure(
                error.clone(),
                format!("Failed to execute MCP tool {tool_name}: {error}"),
            )
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({
                "success": false,
                "message": "Unable to serialize tool result.",
                "error": err.to_string(),
            })
        })
    }
}
