use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::error;

use super::command::Command;
use super::coordinator::Coordinator;
use crate::errors::{BoardError, DenyReason};

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const ACTOR_HEADER: &str = "x-actor-id";

const DEFAULT_ACTIVITY_LIMIT: usize = 50;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub coordinator: Coordinator,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateBoardRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// The acting user, taken from [`ACTOR_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", ACTOR_HEADER)))?;
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(Actor)
            .ok_or_else(|| ApiError::Unauthorized(format!("Invalid {} header", ACTOR_HEADER)))
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
    Unauthorized(String),
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match err {
            // Non-members must not learn the board exists.
            BoardError::Denied {
                board_id,
                reason: DenyReason::NotMember,
            } => ApiError::NotFound(format!("board {} not found", board_id)),
            BoardError::Denied { .. } => ApiError::Forbidden(err.to_string()),
            BoardError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            BoardError::InvalidCommand(msg) => ApiError::BadRequest(msg),
            BoardError::AutomationActionFailed { .. } | BoardError::Internal(_) => {
                error!(error = %err, "Command failed");
                ApiError::Internal("internal error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/boards", post(create_board))
        .route("/api/boards/{id}", get(get_board))
        .route("/api/boards/{id}/activities", get(list_activities))
        .route("/api/commands", post(apply_command))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_board(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Board name must not be empty".into()));
    }
    let board = state.coordinator.create_board(actor, req.name).await?;
    Ok((StatusCode::CREATED, Json(board)))
}

async fn get_board(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.coordinator.board_view(actor, id).await?;
    Ok(Json(view))
}

async fn list_activities(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(id): Path<i64>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    let activities = state.coordinator.activities(actor, id, limit).await?;
    Ok(Json(activities))
}

async fn apply_command(
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Json(command): Json<Command>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.coordinator.apply(actor, command).await?;
    let frames = outcome
        .events
        .iter()
        .map(|e| e.to_frame())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "events": frames })))
}

// ── Tests ─────────────────────────────────────────────────────────────
