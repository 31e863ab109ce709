use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{MockError, MockState};

#[derive(Debug, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    #[serde(default)]
    pub workflow_name: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub error_details: Option<String>,
}

// ─── POST /email/grafananotif ────────────────────────────────────

pub async fn grafana_notification(Json(req): Json<Notification>) -> Result<Json<Value>, MockError> {
    if [&req.to, &req.subject, &req.body].iter().any(|f| f.trim().is_empty()) {
        return Err(MockError::BadRequest("to, subject and body are required".into()));
    }
    Ok(Json(json!({"status": "sent", "to": req.to})))
}

// ─── POST /email/workflow/{success,error} ────────────────────────

pub async fn workflow_success(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(req): Json<WorkflowEvent>,
) -> Result<Json<Value>, MockError> {
    workflow(&state, &headers, req, "success")
}

pub async fn workflow_error(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(req): Json<WorkflowEvent>,
) -> Result<Json<Value>, MockError> {
    workflow(&state, &headers, req, "error")
}

fn workflow(
    state: &MockState,
    headers: &HeaderMap,
    req: WorkflowEvent,
    kind: &str,
) -> Result<Json<Value>, MockError> {
    if state.bearer_owner(headers).is_none() {
        return Err(MockError::Unauthorized("Unauthorized".into()));
    }
    Ok(Json(json!({
        "status": "queued",
        "kind": kind,
        "workflowName": req.workflow_name,
        "timestamp": req.timestamp,
        "errorDetails": req.error_details,
    })))
}
