use super::*;
use crate::mcp::testing::{echo_descriptor, FakeConnector, FakeHub, FAKE_HUB_URL};
use std::sync::atomic::{AtomicUsize, Ordering};

fn manager(hub: &Arc<FakeHub>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        FakeConnector::new(hub.clone()),
        Duration::from_secs(5),
    ))
}

#[test]
fn session_errors_are_classified() {
    assert!(is_session_error("Bad Request: No valid session ID provided"));
    assert!(is_session_error("HTTP 400 Bad Request: session expired"));
    assert!(is_session_error("Invalid session"));
    assert!(is_session_error("missing Session ID header"));
    assert!(!is_session_error("HTTP 400 Bad Request"));
    assert!(!is_session_error("connection refused"));
}

#[test]
fn connection_errors_include_session_errors() {
    assert!(is_connection_error("connection refused"));
    assert!(is_connection_error("MCP request timed out after 60s"));
    assert!(is_connection_error("MCP transport error: reset"));
    assert!(is_connection_error("No valid session ID provided"));
    assert!(!is_connection_error("MCP error -32602: Unknown tool: x"));
}

#[tokio::test]
async fn connections_are_reused_while_live() {
    let hub = FakeHub::new();
    let manager = manager(&hub);

    let first = manager.get_connection(FAKE_HUB_URL).await.expect("connects");
    let second = manager.get_connection(FAKE_HUB_URL).await.expect("reuses");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.kind, TransportKind::StreamableHttp);
    assert_eq!(hub.connects(), 1);
}

#[tokio::test]
async fn sse_urls_connect_with_sse_transport() {
    let hub = FakeHub::new();
    let manager = manager(&hub);

    let connection = manager
        .get_connection("https://hub.example.com/sse")
        .await
        .expect("connects");

    assert_eq!(connection.kind, TransportKind::Sse);
}

#[tokio::test]
async fn concurrent_first_access_runs_one_handshake() {
    let hub = FakeHub::new();
    hub.set_connect_delay(Duration::from_millis(50));
    let manager = manager(&hub);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_connection(FAKE_HUB_URL).await })
        })
        .collect();
    for task in tasks {
        task.await.expect("task joins").expect("connects");
    }

    assert_eq!(hub.connects(), 1);
}

#[tokio::test]
async fn dead_connections_are_replaced() {
    let hub = FakeHub::new();
    let manager = manager(&hub);

    let first = manager.get_connection(FAKE_HUB_URL).await.expect("connects");
    first.client.close().await;
    let second = manager.get_connection(FAKE_HUB_URL).await.expect("reconnects");

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(hub.connects(), 2);
}

#[tokio::test]
async fn reset_evicts_without_reconnecting() {
    let hub = FakeHub::new();
    let manager = manager(&hub);
    manager.get_connection(FAKE_HUB_URL).await.expect("connects");
    manager
        .get_connection("https://other.example.com/mcp")
        .await
        .expect("connects");

    manager.reset(Some(FAKE_HUB_URL)).await;
    assert!(manager.cached(FAKE_HUB_URL).is_none());
    assert_eq!(manager.connection_count(), 1);

    manager.reset(None).await;
    assert_eq!(manager.connection_count(), 0);
    assert_eq!(hub.connects(), 2);
}

#[tokio::test]
async fn session_error_recovers_once_then_succeeds() {
    let hub = FakeHub::with_tools(vec![echo_descriptor()]);
    let manager = manager(&hub);
    manager.get_connection(FAKE_HUB_URL).await.expect("connects");
    hub.fail_next("Bad Request: No valid session ID provided");

    let page = manager
        .with_session_retry(FAKE_HUB_URL, |connection| async move {
            connection.list_tools(None).await
        })
        .await
        .expect("retry succeeds");

    assert_eq!(page.tools.len(), 1);
    assert_eq!(hub.connects(), 2);
    assert_eq!(hub.list_calls(), 2);
}

#[tokio::test]
async fn second_session_error_is_returned_without_third_attempt() {
    let hub = FakeHub::new();
    let manager = manager(&hub);
    hub.fail_next("invalid session");
    hub.fail_next("invalid session");
    hub.fail_next("invalid session");

    let err = manager
        .with_session_retry(FAKE_HUB_URL, |connection| async move {
            connection.list_tools(None).await
        })
        .await
        .expect_err("second failure surfaces");

    assert_eq!(err, "invalid session");
    assert_eq!(hub.list_calls(), 2);
    assert_eq!(hub.connects(), 2);
}

#[tokio::test]
async fn non_session_errors_are_not_retried() {
    let hub = FakeHub::new();
    let manager = manager(&hub);
    hub.fail_next("MCP error -32603: Internal error");

    let err = manager
        .with_session_retry(FAKE_HUB_URL, |connection| async move {
            connection.list_tools(None).await
        })
        .await
        .expect_err("error surfaces");

    assert_eq!(err, "MCP error -32603: Internal error");
    assert_eq!(hub.list_calls(), 1);
    assert_eq!(hub.connects(), 1);
}

#[tokio::test]
async fn custom_classifier_replaces_default() {
    let hub = FakeHub::new();
    let manager = ConnectionManager::new(FakeConnector::new(hub.clone()), Duration::from_secs(5))
        .with_session_classifier(|message| message.contains("expired"));
    hub.fail_next("token expired");

    manager
        .with_session_retry(FAKE_HUB_URL, |connection| async move {
            connection.list_tools(None).await
        })
        .await
        .expect("custom classifier triggers retry");

    assert_eq!(hub.connects(), 2);
}

struct SlowConnection;

#[async_trait]
impl HubConnection for SlowConnection {
    fn is_connected(&self) -> bool {
        true
    }

    async fn list_tools(&self, _cursor: Option<String>) -> Result<ToolPage, String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ToolPage::default())
    }

    async fn call_tool(
        &self,
        _name: &str,
        _arguments: Option<Map<String, Value>>,
    ) -> Result<CallOutcome, String> {
        Ok(CallOutcome::default())
    }

    async fn list_resources(&self) -> Result<ListResourcesResult, String> {
        Err("unsupported".to_string())
    }

    async fn read_resource(&self, _uri: &str) -> Result<ReadResourceResult, String> {
        Err("unsupported".to_string())
    }

    async fn list_prompts(&self) -> Result<ListPromptsResult, String> {
        Err("unsupported".to_string())
    }

    async fn get_prompt(
        &self,
        _name: &str,
        _arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult, String> {
        Err("unsupported".to_string())
    }
}

struct SlowConnector {
    connects: AtomicUsize,
}

#[async_trait]
impl Connector for SlowConnector {
    async fn connect(
        &self,
        _url: &str,
        _kind: TransportKind,
    ) -> Result<Arc<dyn HubConnection>, String> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SlowConnection))
    }
}

#[tokio::test(start_paused = true)]
async fn remote_calls_are_bounded_by_call_timeout() {
    let connector = Arc::new(SlowConnector {
        connects: AtomicUsize::new(0),
    });
    let manager = ConnectionManager::new(connector.clone(), Duration::from_secs(2));

    let err = manager
        .with_session_retry(FAKE_HUB_URL, |connection| async move {
            connection.list_tools(None).await
        })
        .await
        .expect_err("times out");

    assert_eq!(err, "MCP request timed out after 2s");
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}
