use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{Message, MessageKind};
use crate::services::chat_service::ChatService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub message_type: Option<MessageKind>,
}

/// `POST /api/v1/messages`: the request/response twin of the
/// websocket `send_message` event, for clients without a live socket.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = ChatService::send(
        &state.db,
        &state.registry,
        &state.config,
        user.id,
        body.receiver_id,
        body.content,
        body.message_type.unwrap_or(MessageKind::Text),
        None,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `GET /api/v1/conversations/:other_user_id/messages`: most recent
/// first; feed `next_cursor` back to continue into older history.
pub async fn get_message_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(other_user_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let page = ChatService::history(
        &state.db,
        &state.config,
        user.id,
        other_user_id,
        params.limit,
        params.cursor.as_deref(),
    )
    .await?;
    Ok(Json(HistoryResponse {
        messages: page.messages,
        next_cursor: page.next_cursor,
    }))
}
