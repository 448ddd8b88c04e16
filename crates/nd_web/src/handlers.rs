use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use nd_core::{Error, Trigger};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::AppState;

/// Maps the error taxonomy onto HTTP statuses.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::RateLimited { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "Too many requests, please try again later",
                        "retry_after_secs": retry_after_secs,
                    })),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            Error::Busy => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "busy", "message": "Generation already in progress" })),
            )
                .into_response(),
            Error::CapacityExceeded => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Service busy, please try again later" })),
            )
                .into_response(),
            Error::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            other => {
                error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Caller identity for quotas: the peer address, or the first
/// `X-Forwarded-For` hop when the deployment trusts its proxy.
fn caller_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .flatten();
    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn generate(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    info!("🖐️ Manual generation requested");
    // The run continues in the background; its outcome goes to the usage log.
    let _run = state.orchestrator.trigger(Trigger::Manual)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "started",
            "message": "News generation started",
            "mode": Trigger::Manual.mode(),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

pub async fn submit_query(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_identity(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_forwarded_for,
    );
    let submission = state
        .queries
        .submit(&caller, &request.query, request.conversation_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": submission.id, "status": submission.status })),
    ))
}

pub async fn query_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.queries.status(id) {
        Some(conversation) => (
            StatusCode::OK,
            Json(json!({
                "id": conversation.id,
                "status": conversation.status,
                "query": conversation.query,
                "result": conversation.result,
                "error": conversation.error,
                "history_len": conversation.history.len(),
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Conversation not found or expired" })),
        ),
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.guard().status();
    Json(json!({
        "status": "healthy",
        "in_progress": status.in_progress,
        "phase": status.phase,
        "current_trigger": status.current_trigger,
        "last_manual": status.last_manual,
        "last_scheduled": status.last_scheduled,
        "conversations": state.conversations().len(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UsageParams {
    pub days: Option<i64>,
}

pub async fn usage(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let days = params.days.unwrap_or(7).max(0);
    let summary = state.usage.summary(days).await?;
    Ok(Json(json!({ "days": days, "summary": summary })))
}
