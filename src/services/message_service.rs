use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ConversationKey, Message, MessageKind};

/// Opaque pagination token: the `(created_at, id)` position of the last
/// message on the previous page. Ties in `created_at` between
/// concurrent senders are broken by the message id, so feeding a page's
/// cursor back always yields a disjoint, contiguous continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl PageCursor {
    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.created_at.timestamp_micros(), self.id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> AppResult<Self> {
        let invalid = || AppError::InvalidArgument("invalid pagination cursor".into());
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        let raw = String::from_utf8(raw).map_err(|_| invalid())?;
        let (micros, id) = raw.split_once(':').ok_or_else(invalid)?;
        let micros: i64 = micros.parse().map_err(|_| invalid())?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(invalid)?;
        let id = Uuid::parse_str(id).map_err(|_| invalid())?;
        Ok(Self { created_at, id })
    }
}

#[derive(Debug)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

pub struct MessageService;

impl MessageService {
    /// Persist one message. Durable before return; the timestamp is
    /// assigned here, truncated to the microsecond precision Postgres
    /// stores, so the returned record equals the stored one.
    pub async fn append(
        db: &Pool<Postgres>,
        key: &ConversationKey,
        sender_id: Uuid,
        recipient_id: Uuid,
        kind: MessageKind,
        body: String,
    ) -> AppResult<Message> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let created_at = DateTime::<Utc>::from_timestamp_micros(now.timestamp_micros())
            .unwrap_or(now);

        sqlx::query(
            "INSERT INTO messages (id, conversation_key, sender_id, recipient_id, kind, body, read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)",
        )
        .bind(id)
        .bind(key.as_str())
        .bind(sender_id)
        .bind(recipient_id)
        .bind(kind.as_str())
        .bind(&body)
        .bind(created_at)
        .execute(db)
        .await?;

        Ok(Message {
            id,
            conversation_key: key.clone(),
            sender_id,
            recipient_id,
            kind,
            body,
            read: false,
            created_at,
            edited_at: None,
        })
    }

    /// Reverse-chronological page of at most `limit` messages, starting
    /// strictly before `cursor` when supplied. `next_cursor` is present
    /// iff older messages remain.
    pub async fn page(
        db: &Pool<Postgres>,
        key: &ConversationKey,
        limit: i64,
        cursor: Option<PageCursor>,
    ) -> AppResult<MessagePage> {
        // Fetch one past the limit to learn whether a further page exists.
        let rows = match cursor {
            Some(c) => {
                sqlx::query(
                    "SELECT id, conversation_key, sender_id, recipient_id, kind, body, read, created_at, edited_at \
                     FROM messages \
                     WHERE conversation_key = $1 AND (created_at, id) < ($2, $3) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $4",
                )
                .bind(key.as_str())
                .bind(c.created_at)
                .bind(c.id)
                .bind(limit + 1)
                .fetch_all(db)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, conversation_key, sender_id, recipient_id, kind, body, read, created_at, edited_at \
                     FROM messages \
                     WHERE conversation_key = $1 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $2",
                )
                .bind(key.as_str())
                .bind(limit + 1)
                .fetch_all(db)
                .await?
            }
        };

        let has_more = rows.len() as i64 > limit;
        let messages: Vec<Message> = rows
            .into_iter()
            .take(limit as usize)
            .map(map_message_row)
            .collect::<AppResult<_>>()?;

        let next_cursor = if has_more {
            messages.last().map(|m| {
                PageCursor {
                    created_at: m.created_at,
                    id: m.id,
                }
                .encode()
            })
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }

    /// Mark every unread message in the conversation addressed to
    /// `reader_id` as read. One conditional UPDATE, so re-invoking on an
    /// already-read conversation is a no-op returning 0.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        key: &ConversationKey,
        reader_id: Uuid,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET read = TRUE \
             WHERE conversation_key = $1 AND recipient_id = $2 AND NOT read",
        )
        .bind(key.as_str())
        .bind(reader_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}

fn map_message_row(row: PgRow) -> AppResult<Message> {
    let key: String = row.get("conversation_key");
    let kind: String = row.get("kind");
    Ok(Message {
        id: row.get("id"),
        conversation_key: ConversationKey::parse(&key)?,
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        kind: MessageKind::from_str(&kind),
        body: row.get("body"),
        read: row.get("read"),
        created_at: row.get("created_at"),
        edited_at: row.get("edited_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let cursor = PageCursor {
            created_at: DateTime::<Utc>::from_timestamp_micros(1_700_000_123_456_789).unwrap(),
            id: Uuid::new_v4(),
        };
        let decoded = PageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn cursor_rejects_garbage() {
        assert!(PageCursor::decode("").is_err());
        assert!(PageCursor::decode("not base64 !!!").is_err());
        // Valid base64, wrong payload shape.
        let token = URL_SAFE_NO_PAD.encode("no-separator-here");
        assert!(PageCursor::decode(&token).is_err());
        let token = URL_SAFE_NO_PAD.encode("123:not-a-uuid");
        assert!(PageCursor::decode(&token).is_err());
    }
}
