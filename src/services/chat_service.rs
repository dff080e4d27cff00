use std::future::Future;
use std::time::Duration;

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKey, Message, MessageKind};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::{MessagePage, MessageService, PageCursor};
use crate::websocket::events::WsOutboundEvent;
use crate::websocket::{SessionId, SessionRegistry};

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Transport-independent orchestration of the messaging core. Every
/// inbound send/join/leave/typing/history/read request lands here,
/// whether it arrived over the websocket or the HTTP surface.
pub struct ChatService;

impl ChatService {
    /// Persist and fan out one message.
    ///
    /// Persistence (`append` + `touch`) blocks the caller; fan-out is
    /// spawned and its outcome is never surfaced. The returned message
    /// means "durably stored", nothing more. `origin` is the sending
    /// session for websocket sends, so the group broadcast skips it.
    pub async fn send(
        db: &Pool<Postgres>,
        registry: &SessionRegistry,
        config: &Config,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: String,
        kind: MessageKind,
        origin: Option<SessionId>,
    ) -> AppResult<Message> {
        let body_trimmed = body.trim();
        if body_trimmed.is_empty() {
            return Err(AppError::InvalidArgument("message body is empty".into()));
        }
        if body.len() > config.max_body_bytes {
            return Err(AppError::InvalidArgument(format!(
                "message body exceeds {} bytes",
                config.max_body_bytes
            )));
        }
        // Rejects self-send and nil ids.
        let key = ConversationKey::between(sender_id, receiver_id)?;

        let message = with_retry(|| {
            MessageService::append(db, &key, sender_id, receiver_id, kind, body.clone())
        })
        .await?;

        with_retry(|| ConversationService::touch(db, &key, &message)).await?;

        crate::metrics::MESSAGES_SENT.inc();

        // Fan-out is asynchronous relative to this call's return and
        // best-effort: a sender learns whether persistence succeeded,
        // never whether live delivery did.
        let registry = registry.clone();
        let fan_key = key;
        let fan_message = message.clone();
        tokio::spawn(async move {
            let sent = WsOutboundEvent::MessageSent {
                message: fan_message.clone(),
            };
            let received = WsOutboundEvent::MessageReceived {
                message: fan_message,
            };
            registry.route(sender_id, &sent).await;
            registry.route(receiver_id, &received).await;
            registry.broadcast(&fan_key, &received, origin).await;
        });

        Ok(message)
    }

    /// Join the caller's session to the conversation's broadcast group
    /// and mark the messages addressed to the caller as read: joining
    /// means "I am now viewing this conversation".
    pub async fn join_conversation(
        db: &Pool<Postgres>,
        registry: &SessionRegistry,
        session: SessionId,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<ConversationKey> {
        let key = ConversationKey::between(user_id, other_user_id)?;
        registry.join(session, &key).await;
        let marked = with_retry(|| MessageService::mark_read(db, &key, user_id)).await?;
        if marked > 0 {
            tracing::debug!(%key, %user_id, marked, "marked messages read on join");
        }
        Ok(key)
    }

    /// Leave one conversation's broadcast group. The caller must be a
    /// participant of the named conversation; other memberships and the
    /// session itself are untouched.
    pub async fn leave_conversation(
        registry: &SessionRegistry,
        session: SessionId,
        user_id: Uuid,
        conversation_id: &str,
    ) -> AppResult<ConversationKey> {
        let key = ConversationKey::parse(conversation_id)?;
        let (low, high) = key.participants();
        if user_id != low && user_id != high {
            return Err(AppError::Forbidden);
        }
        registry.leave(session, &key).await;
        Ok(key)
    }

    /// Relay a transient typing indicator to every live session of the
    /// peer, and to none of the sender's own sessions. Not persisted,
    /// no ordering guarantee relative to message events.
    pub async fn typing(
        registry: &SessionRegistry,
        sender_id: Uuid,
        other_user_id: Uuid,
        is_typing: bool,
    ) -> AppResult<()> {
        // Validates the pair even though the key itself is not needed.
        ConversationKey::between(sender_id, other_user_id)?;
        let event = WsOutboundEvent::UserTyping {
            user_id: sender_id,
            is_typing,
        };
        registry.route(other_user_id, &event).await;
        Ok(())
    }

    /// Paginated history between the caller and `other_user_id`.
    /// Deriving the key from the caller's verified id is what scopes
    /// access: a caller can only ever name conversations it is in.
    pub async fn history(
        db: &Pool<Postgres>,
        config: &Config,
        user_id: Uuid,
        other_user_id: Uuid,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> AppResult<MessagePage> {
        let key = ConversationKey::between(user_id, other_user_id)?;
        let limit = limit
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size);
        let cursor = cursor.map(PageCursor::decode).transpose()?;
        MessageService::page(db, &key, limit, cursor).await
    }

    pub async fn mark_conversation_read(
        db: &Pool<Postgres>,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<u64> {
        let key = ConversationKey::between(user_id, other_user_id)?;
        with_retry(|| MessageService::mark_read(db, &key, user_id)).await
    }

    pub async fn list_conversations(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> AppResult<Vec<Conversation>> {
        ConversationService::list_for_user(db, user_id).await
    }
}

/// One bounded retry for transient storage failures. A pool timeout
/// never reached the database, so the retry cannot duplicate; an IO
/// error mid-flight is unknown-outcome and the possible duplicate on
/// retry is an accepted, documented limitation.
async fn with_retry<T, F, Fut>(op: F) -> AppResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match op().await {
        Err(err) if err.is_retryable() => {
            tracing::warn!(error = %err, "retryable storage failure, backing off once");
            tokio::time::sleep(RETRY_BACKOFF).await;
            op().await
        }
        other => other,
    }
}
