use super::*;
use crate::core::clock::ManualClock;
use crate::core::config::HubConfig;
use crate::mcp::connection::ConnectionManager;
use crate::mcp::testing::{echo_descriptor, FakeConnector, FakeHub, FAKE_HUB_URL};
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request};
use tower::ServiceExt;

fn state_for(hub: &Arc<FakeHub>, hub_url: Option<&str>) -> ControlState {
    let config = HubConfig {
        hub_url: hub_url.map(str::to_string),
        ..HubConfig::default()
    };
    let connections = Arc::new(ConnectionManager::new(
        FakeConnector::new(hub.clone()),
        config.call_timeout(),
    ));
    let registry = Arc::new(ToolRegistry::new(
        &config,
        connections.clone(),
        Arc::new(ManualClock::new()),
    ));
    let hub = Arc::new(HubFacade::new(
        config.hub_url().map(str::to_string),
        connections,
    ));
    ControlState { registry, hub }
}

fn state(hub: &Arc<FakeHub>) -> ControlState {
    state_for(hub, Some(FAKE_HUB_URL))
}

async fn send(state: ControlState, method: Method, uri: &str) -> (StatusCode, Value) {
    send_body(state, method, uri, Body::empty()).await
}

async fn send_body(
    state: ControlState,
    method: Method,
    uri: &str,
    body: Body,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .expect("valid request");
    let response = router(state).oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, value)
}

#[tokio::test]
async fn health_returns_ok() {
    let (status, body) = send(state(&FakeHub::new()), Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn status_lists_registered_tools() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);

    let (status, body) = send(state(&hub), Method::GET, "/api/mcp/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connected");
    assert_eq!(body["toolsCount"], 1);
    assert_eq!(body["tools"], json!(["mcp_echo"]));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn status_of_empty_hub_is_success() {
    let (status, body) = send(state(&FakeHub::new()), Method::GET, "/api/mcp/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["toolsCount"], 0);
    assert_eq!(body["tools"], json!([]));
}

#[tokio::test]
async fn status_reports_unreachable_hub() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    hub.set_unreachable(true);

    let (status, body) = send(state(&hub), Method::GET, "/api/mcp/status").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["error"], "connection refused");
    assert_eq!(body["toolsCount"], 0);
}

#[tokio::test]
async fn status_without_hub_url_is_disabled() {
    let (status, body) = send(
        state_for(&FakeHub::new(), None),
        Method::GET,
        "/api/mcp/status",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disabled");
}

#[tokio::test]
async fn reset_reconnects_and_rediscovers() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let state = state(&hub);
    state.registry.get_tools().await;

    let (status, body) = send(state.clone(), Method::POST, "/api/mcp/reset").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "reset");
    assert_eq!(body["toolsDiscovered"], 1);
    assert_eq!(hub.connects(), 2);
    assert_eq!(hub.list_calls(), 2);
}

#[tokio::test]
async fn reset_rejects_unknown_actions() {
    let (status, body) = send(
        state(&FakeHub::new()),
        Method::POST,
        "/api/mcp/reset?action=restart",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid action: restart");
    assert_eq!(body["message"], "Supported actions: reset");
}

#[tokio::test]
async fn invalidate_then_count_rediscovers() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let state = state(&hub);

    let (_, first) = send(state.clone(), Method::GET, "/api/mcp/tools-count").await;
    assert_eq!(first["count"], 1);
    assert_eq!(first["fromCache"], true);

    let (status, _) = send(state.clone(), Method::POST, "/api/mcp/invalidate-cache").await;
    assert_eq!(status, StatusCode::OK);
    send(state.clone(), Method::GET, "/api/mcp/tools-count").await;

    assert_eq!(hub.list_calls(), 2);
}

#[tokio::test]
async fn forced_count_reports_discovery_failure() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let state = state(&hub);
    send(state.clone(), Method::GET, "/api/mcp/tools-count").await;
    hub.fail_next("MCP error -32603: Internal error");

    let (status, body) = send(state, Method::GET, "/api/mcp/tools-count?refresh=true").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "MCP error -32603: Internal error");
    assert_eq!(body["message"], "Failed to get MCP tools count");
}

#[tokio::test]
async fn report_counts_compatible_tools() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);

    let (status, body) = send(state(&hub), Method::GET, "/api/mcp/report").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["totalTools"], 1);
    assert_eq!(body["report"]["compatibleWithOpenai"], 1);
}

#[tokio::test]
async fn hub_endpoint_runs_facade_actions() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let payload = json!({
        "action": "call_tool",
        "tool_name": "echo",
        "tool_parameters": { "text": "via http" }
    });

    let (status, body) = send_body(
        state(&hub),
        Method::POST,
        "/api/mcp/hub",
        Body::from(payload.to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"][0]["text"], "via http");
}
