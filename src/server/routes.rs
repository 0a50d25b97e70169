//! HTTP route handlers for the conversation API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::conversations::{Conversation, ConversationPatch, ServiceError};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/conversations/",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}/",
            get(get_conversation)
                .put(replace_conversation)
                .patch(patch_conversation)
                .delete(delete_conversation),
        )
        .route("/api/conversations/{id}/messages/", post(post_message))
        .route("/api/conversations/{id}/end/", post(end_conversation))
        .route("/api/query/", post(query_conversations))
        .with_state(state)
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error.
    pub error: String,
}

/// Error response returned by every handler.
pub type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn service_error(err: ServiceError) -> ApiError {
    match err {
        ServiceError::Validation(message) => api_error(StatusCode::BAD_REQUEST, message),
        ServiceError::NotFound(_) => api_error(StatusCode::NOT_FOUND, err.to_string()),
        ServiceError::Store(_) => {
            tracing::error!("Storage failure: {err}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// A missing or unreadable JSON body reads as an empty request, so the
/// handler reports the missing field instead of axum's plain-text rejection.
fn json_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> T {
    match body {
        Ok(Json(value)) => value,
        Err(rejection) => {
            tracing::debug!("Ignoring request body: {rejection}");
            T::default()
        }
    }
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ai_mode = if state.service.gateway().is_live() {
        "live"
    } else {
        "simulated"
    };
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-recall",
        "version": env!("CARGO_PKG_VERSION"),
        "ai_mode": ai_mode
    }))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state.service.list().await.map_err(service_error)?;
    Ok(Json(conversations))
}

/// Conversation creation request.
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    /// Display title.
    pub title: Option<String>,
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let Some(title) = json_or_default(body).title else {
        return Err(api_error(StatusCode::BAD_REQUEST, "title field is required"));
    };

    let conversation = state.service.create(&title).await.map_err(service_error)?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state.service.get(id).await.map_err(service_error)?;
    Ok(Json(conversation))
}

async fn replace_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<ConversationPatch>, JsonRejection>,
) -> Result<Json<Conversation>, ApiError> {
    let patch = json_or_default(body);
    if patch.title.is_none() {
        return Err(api_error(StatusCode::BAD_REQUEST, "title field is required"));
    }
    let conversation = state.service.update(id, patch).await.map_err(service_error)?;
    Ok(Json(conversation))
}

async fn patch_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<ConversationPatch>, JsonRejection>,
) -> Result<Json<Conversation>, ApiError> {
    let patch = json_or_default(body);
    let conversation = state.service.update(id, patch).await.map_err(service_error)?;
    Ok(Json(conversation))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(id).await.map_err(service_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// New message request.
#[derive(Debug, Default, Deserialize)]
pub struct MessageRequest {
    /// Message body.
    pub content: Option<String>,
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<Conversation>, ApiError> {
    let content = json_or_default(body).content.unwrap_or_default();
    let conversation = state
        .service
        .post_message(id, &content)
        .await
        .map_err(service_error)?;
    Ok(Json(conversation))
}

async fn end_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state.service.end(id).await.map_err(service_error)?;
    Ok(Json(conversation))
}

/// Cross-conversation query request.
#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    /// The question.
    pub query: Option<String>,
}

/// Cross-conversation query response.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    /// Answer text.
    pub response: String,
}

async fn query_conversations(
    State(state): State<Arc<AppState>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let query = json_or_default(body).query.unwrap_or_default();
    let response = state.service.query(&query).await.map_err(service_error)?;
    Ok(Json(QueryResponse { response }))
}
