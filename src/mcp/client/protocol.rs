use rust_mcp_schema::schema_utils::ServerMessage;
use rust_mcp_schema::{
    GetPromptResult, InitializeResult, ListPromptsResult, ListResourcesResult,
    PaginatedRequestParams, ReadResourceResult, RpcError,
};
use serde_json::Value;

use crate::mcp::connection::{CallOutcome, ToolPage};

pub(crate) fn parse_initialize_result(message: ServerMessage) -> Result<InitializeResult, String> {
    let value = parse_response_value(message)?;
    let result =
        serde_json::from_value::<InitializeResult>(value).map_err(|err| err.to_string())?;
    if result.protocol_version.trim().is_empty() {
        return Err("Unexpected initialize response.".to_string());
    }
    Ok(result)
}

pub(crate) fn parse_tool_page(message: ServerMessage) -> Result<ToolPage, String> {
    parse_response(message)
}

pub(crate) fn parse_call_outcome(message: ServerMessage) -> Result<CallOutcome, String> {
    parse_response(message)
}

pub(crate) fn parse_list_resources(message: ServerMessage) -> Result<ListResourcesResult, String> {
    parse_response(message)
}

pub(crate) fn parse_read_resource(message: ServerMessage) -> Result<ReadResourceResult, String> {
    parse_response(message)
}

pub(crate) fn parse_list_prompts(message: ServerMessage) -> Result<ListPromptsResult, String> {
    parse_response(message)
}

pub(crate) fn parse_get_prompt(message: ServerMessage) -> Result<GetPromptResult, String> {
    parse_response(message)
}

fn parse_response<T: serde::de::DeserializeOwned>(message: ServerMessage) -> Result<T, String> {
    let value = parse_response_value(message)?;
    serde_json::from_value::<T>(value).map_err(|err| err.to_string())
}

pub(crate) fn parse_response_value(message: ServerMessage) -> Result<Value, String> {
    match message {
        ServerMessage::Response(response) => {
            serde_json::to_value(&response.result).map_err(|err| err.to_string())
        }
        ServerMessage::Error(error) => Err(format_rpc_error(&error.error)),
        other => Err(format!("Unexpected MCP server message: {other:?}")),
    }
}

pub(crate) fn paginated_params(cursor: Option<String>) -> Option<PaginatedRequestParams> {
    cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    })
}

pub(crate) fn format_rpc_error(error: &RpcError) -> String {
    let mut output = format!("MCP error {}: {}", error.code, error.message);
    if let Some(data) = &error.data {
        let details = data
            .get("details")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .or_else(|| data.as_str().map(|value| value.to_string()))
            .or_else(|| serde_json::to_string_pretty(data).ok());

        if let Some(details) = details {
            if !details.is_empty() {
                output.push('\n');
                output.push_str(&details);
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: Value) -> ServerMessage {
        serde_json::from_value(value).expect("message should parse")
    }

    #[test]
    fn parse_initialize_rejects_blank_protocol_version() {
        let reply = message(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "capabilities": {},
                "protocolVersion": " ",
                "serverInfo": {"name": "x", "version": "1.0.0"}
            }
        }));

        assert!(parse_initialize_result(reply).is_err());
    }

    #[test]
    fn tool_page_keeps_raw_input_schema() {
        let reply = message(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {
                "tools": [{
                    "name": "echo",
                    "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
                }],
                "nextCursor": "page-2"
            }
        }));

        let page = parse_tool_page(reply).expect("page parses");
        assert_eq!(page.tools.len(), 1);
        assert_eq!(page.tools[0].name, "echo");
        assert_eq!(page.tools[0].description, None);
        assert_eq!(
            page.tools[0].input_schema["properties"]["text"]["type"],
            "string"
        );
        assert_eq!(page.next_cursor.as_deref(), Some("page-2"));
    }

    #[test]
    fn rpc_errors_include_details() {
        let reply = message(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32000, "message": "Bad Request", "data": {"details": "No valid session ID provided"}}
        }));

        let err = parse_call_outcome(reply).expect_err("rpc error");
        assert_eq!(
            err,
            "MCP error -32000: Bad Request\nNo valid session ID provided"
        );
    }

    #[test]
    fn call_outcome_defaults_missing_fields() {
        let reply = message(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "result": {"content": [{"type": "text", "text": "hi"}]}
        }));

        let outcome = parse_call_outcome(reply).expect("outcome parses");
        assert!(!outcome.is_error);
        assert_eq!(outcome.content, vec![json!({"type": "text", "text": "hi"})]);
    }
}
