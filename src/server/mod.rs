//! HTTP control surface for operators: status, reset, cache invalidation,
//! tool counts and the compatibility report.

pub mod error;

use crate::mcp::hub::{HubFacade, HubRequest};
use crate::mcp::registry::ToolRegistry;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use error::{ActionError, ControlError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ControlState {
    pub registry: Arc<ToolRegistry>,
    pub hub: Arc<HubFacade>,
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/api/mcp/status", get(status))
        .route("/api/mcp/reset", get(status).post(reset))
        .route("/api/mcp/invalidate-cache", post(invalidate_cache))
        .route("/api/mcp/tools-count", get(tools_count))
        .route("/api/mcp/report", get(report))
        .route("/api/mcp/hub", post(hub_action))
        .route("/health", get(health))
        .with_state(state)
}

/// Binds `listen` and serves until ctrl-c.
pub async fn serve(listen: &str, state: ControlState) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|err| format!("Failed to bind {listen}: {err}"))?;
    info!(listen = %listen, "Control server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| format!("Control server failed: {err}"))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutting down control server");
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(state): State<ControlState>) -> Response {
    let registry = &state.registry;
    if registry.hub_url().is_none() {
        return Json(json!({
            "success": true,
            "status": "disabled",
            "toolsCount": 0,
            "message": "MCP integration is disabled",
            "timestamp": timestamp(),
        }))
        .into_response();
    }

    let snapshot = registry.get_tools().await;
    match registry.last_error() {
        Some(err) if snapshot.is_empty() => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "status": "disconnected",
                "toolsCount": 0,
                "error": err,
                "message": "Failed to connect to MCP Hub",
                "timestamp": timestamp(),
            })),
        )
            .into_response(),
        _ => Json(json!({
            "success": true,
            "status": "connected",
            "toolsCount": snapshot.len(),
            "tools": snapshot.names(),
            "message": format!("MCP Hub connected with {} tools available", snapshot.len()),
            "timestamp": timestamp(),
        }))
        .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ResetQuery {
    action: Option<String>,
}

async fn reset(
    State(state): State<ControlState>,
    Query(query): Query<ResetQuery>,
) -> Result<Json<Value>, ActionError> {
    let action = query.action.unwrap_or_else(|| "reset".to_string());
    if action != "reset" {
        return Err(ActionError::new(
            ControlError::BadRequest(format!("Invalid action: {action}")),
            "Supported actions: reset",
        ));
    }

    state.registry.force_reset().await;
    let snapshot = state.registry.get_tools().await;
    if let Some(err) = state.registry.last_error() {
        return Err(ActionError::new(
            ControlError::Hub(err),
            "Failed to reset MCP connections",
        ));
    }
    Ok(Json(json!({
        "success": true,
        "action": "reset",
        "toolsDiscovered": snapshot.len(),
        "message": "MCP connections reset successfully",
        "timestamp": timestamp(),
    })))
}

async fn invalidate_cache(State(state): State<ControlState>) -> Json<Value> {
    state.registry.invalidate();
    info!("MCP tools cache invalidated via control API");
    Json(json!({
        "success": true,
        "message": "MCP tools cache invalidated successfully",
        "timestamp": timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct CountQuery {
    refresh: Option<String>,
}

async fn tools_count(
    State(state): State<ControlState>,
    Query(query): Query<CountQuery>,
) -> Result<Json<Value>, ActionError> {
    let force_refresh = query.refresh.as_deref() == Some("true");
    let count = if force_refresh {
        state.registry.invalidate();
        state
            .registry
            .discover()
            .await
            .map_err(|err| {
                ActionError::new(ControlError::Hub(err), "Failed to get MCP tools count")
            })?
            .len()
    } else {
        state.registry.get_tools().await.len()
    };
    Ok(Json(json!({
        "success": true,
        "count": count,
        "fromCache": !force_refresh,
        "timestamp": timestamp(),
    })))
}

async fn report(State(state): State<ControlState>) -> Json<Value> {
    let report = state.registry.compatibility_report().await;
    Json(json!({
        "success": true,
        "report": report,
        "timestamp": timestamp(),
    }))
}

async fn hub_action(
    State(state): State<ControlState>,
    Json(request): Json<HubRequest>,
) -> Json<Value> {
    Json(state.hub.execute(request).await.to_json())
}

#[cfg(test)]
mod tests;
