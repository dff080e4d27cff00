use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::Conversation;
use crate::services::chat_service::ChatService;
use crate::state::AppState;

/// `GET /api/v1/conversations`: every conversation the caller is a
/// participant of.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    let conversations = ChatService::list_conversations(&state.db, user.id).await?;
    Ok(Json(conversations))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

/// `POST /api/v1/conversations/:other_user_id/read`: mark the
/// caller's unread messages from the peer as read. Idempotent.
pub async fn mark_as_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(other_user_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let updated = ChatService::mark_conversation_read(&state.db, user.id, other_user_id).await?;
    Ok(Json(MarkReadResponse { updated }))
}
