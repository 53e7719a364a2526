//! REST endpoints for flow sessions.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use super::intent::{Intent, IntentRequest};
use super::orchestrator::Orchestrator;
use super::registry::SessionRegistry;
use super::state::FlowKind;
use super::ws::ws_handler;
use crate::error::FlowError;

/// Shared state for flow routes.
#[derive(Clone)]
pub struct FlowRouteState {
    pub registry: Arc<SessionRegistry>,
}

/// Build the flow REST + WebSocket routes.
pub fn flow_routes(registry: Arc<SessionRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/flows", post(create_flow))
        .route("/api/flows/{id}", get(get_flow).delete(delete_flow))
        .route("/api/flows/{id}/intents", post(submit_intent))
        .route("/api/flows/{id}/back", post(go_back))
        .route("/api/flows/{id}/reset", post(reset_flow))
        .route("/api/flows/{id}/ws", get(ws_handler))
        .layer(cors)
        .with_state(FlowRouteState { registry })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn flow_error_response(err: &FlowError) -> Response {
    match err {
        FlowError::SessionNotFound { .. } => error_response(StatusCode::NOT_FOUND, err.to_string()),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Resolve the `{id}` path segment to a live session.
pub(super) async fn lookup(
    registry: &SessionRegistry,
    id: &str,
) -> Result<Arc<Orchestrator>, Response> {
    let id = Uuid::parse_str(id)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid flow ID"))?;
    registry.get(id).await.map_err(|e| flow_error_response(&e))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "onboard-flow"
    }))
}

#[derive(Deserialize)]
struct CreateFlowRequest {
    kind: FlowKind,
}

/// POST /api/flows
async fn create_flow(
    State(state): State<FlowRouteState>,
    body: Result<Json<CreateFlowRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    match state.registry.create(body.kind).await {
        Ok(flow) => {
            info!(session_id = %flow.id(), kind = %body.kind, "Flow created via REST");
            (StatusCode::CREATED, Json(flow.snapshot().await)).into_response()
        }
        Err(e) => flow_error_response(&e),
    }
}

/// GET /api/flows/{id}
async fn get_flow(State(state): State<FlowRouteState>, Path(id): Path<String>) -> Response {
    match lookup(&state.registry, &id).await {
        Ok(flow) => Json(flow.snapshot().await).into_response(),
        Err(response) => response,
    }
}

/// POST /api/flows/{id}/intents
///
/// Runs the intent and returns the resulting snapshot. Action failures
/// are part of the snapshot, not the status code.
async fn submit_intent(
    State(state): State<FlowRouteState>,
    Path(id): Path<String>,
    body: Result<Json<IntentRequest>, JsonRejection>,
) -> Response {
    let flow = match lookup(&state.registry, &id).await {
        Ok(flow) => flow,
        Err(response) => return response,
    };
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(session_id = %flow.id(), error = %rejection.body_text(), "Malformed intent");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match flow.invoke(Intent::from(request)).await {
        Ok(()) => Json(flow.snapshot().await).into_response(),
        Err(e) => flow_error_response(&e),
    }
}

/// POST /api/flows/{id}/back
async fn go_back(State(state): State<FlowRouteState>, Path(id): Path<String>) -> Response {
    let flow = match lookup(&state.registry, &id).await {
        Ok(flow) => flow,
        Err(response) => return response,
    };
    let moved = flow.go_back().await;
    Json(serde_json::json!({
        "moved": moved,
        "snapshot": flow.snapshot().await,
    }))
    .into_response()
}

/// POST /api/flows/{id}/reset
async fn reset_flow(State(state): State<FlowRouteState>, Path(id): Path<String>) -> Response {
    let flow = match lookup(&state.registry, &id).await {
        Ok(flow) => flow,
        Err(response) => return response,
    };
    flow.reset().await;
    Json(flow.snapshot().await).into_response()
}

/// DELETE /api/flows/{id}
async fn delete_flow(State(state): State<FlowRouteState>, Path(id): Path<String>) -> Response {
    let id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid flow ID"),
    };
    match state.registry.remove(id).await {
        Ok(()) => Json(serde_json::json!({"status": "cancelled"})).into_response(),
        Err(e) => flow_error_response(&e),
    }
}
