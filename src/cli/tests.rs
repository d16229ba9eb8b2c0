use super::*;
use crate::mcp::testing::{echo_descriptor, FakeConnector, FakeHub, FAKE_HUB_URL};
use serde_json::json;

fn parse_args(argv: &[&str]) -> Args {
    Args::try_parse_from(argv)
        .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
}

#[test]
fn global_flags_parse_after_subcommand() {
    let args = parse_args(&[
        "hubtools",
        "tools",
        "--refresh",
        "--hub-url",
        "https://hub.example.com/mcp",
        "--log-level",
        "debug",
    ]);

    assert!(matches!(args.command, Commands::Tools { refresh: true }));
    assert_eq!(args.hub_url.as_deref(), Some("https://hub.example.com/mcp"));
    assert_eq!(args.log_level.as_deref(), Some("debug"));
}

#[test]
fn hub_action_is_parsed_from_snake_case() {
    let args = parse_args(&["hubtools", "hub", "read_resource", "--uri", "file:///a"]);

    match args.command {
        Commands::Hub { action, uri, .. } => {
            assert_eq!(action, HubAction::ReadResource);
            assert_eq!(uri.as_deref(), Some("file:///a"));
        }
        _ => panic!("expected hub command"),
    }
}

#[test]
fn unknown_hub_action_is_rejected() {
    assert!(Args::try_parse_from(["hubtools", "hub", "delete_everything"]).is_err());
}

#[test]
fn call_requires_a_tool_name() {
    assert!(Args::try_parse_from(["hubtools", "call"]).is_err());
    let args = parse_args(&["hubtools", "call", "echo", "--args", r#"{"text":"hi"}"#]);
    assert!(matches!(args.command, Commands::Call { ref tool, .. } if tool == "echo"));
}

#[test]
fn json_arguments_must_be_objects() {
    assert_eq!(parse_json_object(None), Ok(Map::new()));
    assert_eq!(parse_json_object(Some("  ")), Ok(Map::new()));
    assert_eq!(
        parse_json_object(Some("[1]")),
        Err("--args must be a JSON object".to_string())
    );
    assert!(parse_json_object(Some("{oops"))
        .unwrap_err()
        .starts_with("--args is not valid JSON"));
}

#[test]
fn call_tool_flags_map_to_tool_fields() {
    let request = hub_request(
        HubAction::CallTool,
        Some("echo".to_string()),
        None,
        Some(r#"{"text":"hi"}"#),
    )
    .expect("valid request");

    assert_eq!(request.tool_name.as_deref(), Some("echo"));
    assert_eq!(
        request.tool_parameters.map(Value::Object),
        Some(json!({ "text": "hi" }))
    );
    assert!(request.prompt_name.is_none());
}

#[test]
fn prompt_arguments_are_stringified() {
    let request = hub_request(
        HubAction::GetPrompt,
        Some("summarize".to_string()),
        None,
        Some(r#"{"topic":"rust","limit":3}"#),
    )
    .expect("valid request");

    assert_eq!(request.prompt_name.as_deref(), Some("summarize"));
    let arguments = request.prompt_arguments.expect("arguments set");
    assert_eq!(arguments.get("topic").map(String::as_str), Some("rust"));
    assert_eq!(arguments.get("limit").map(String::as_str), Some("3"));
}

fn fake_services(hub: &Arc<FakeHub>) -> Services {
    let config = HubConfig {
        hub_url: Some(FAKE_HUB_URL.to_string()),
        ..HubConfig::default()
    };
    Services::with_connector(config, FakeConnector::new(hub.clone()))
}

#[tokio::test]
async fn failed_hub_action_is_an_error_and_sessions_still_close() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let services = fake_services(&hub);
    let command = Commands::Hub {
        action: HubAction::CallTool,
        name: Some("missing".to_string()),
        uri: None,
        args: None,
    };

    let outcome = run(&services, command).await;
    assert_eq!(
        outcome.map_err(|err| err.to_string()),
        Err("MCP error -32602: Unknown tool: missing".to_string())
    );
    assert_eq!(services.registry.connections().connection_count(), 1);

    services.shutdown().await;
    assert_eq!(services.registry.connections().connection_count(), 0);
}

#[tokio::test]
async fn unknown_call_target_is_an_error() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let services = fake_services(&hub);
    let command = Commands::Call {
        tool: "nope".to_string(),
        args: None,
    };

    let outcome = run(&services, command).await;

    assert_eq!(
        outcome.map_err(|err| err.to_string()),
        Err("Unknown tool: nope".to_string())
    );
}

#[tokio::test]
async fn successful_call_returns_ok() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let services = fake_services(&hub);
    let command = Commands::Call {
        tool: "echo".to_string(),
        args: Some(r#"{"text":"hi"}"#.to_string()),
    };

    assert!(run(&services, command).await.is_ok());
    services.shutdown().await;
}
