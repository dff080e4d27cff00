use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, ConversationKey, Message};

/// How a `touch` resolved: the caller's first message created the
/// summary row, or an existing row had its last-message pointer moved.
/// Losing a concurrent create race degrades into `Updated`, never into
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Created,
    Updated,
}

pub struct ConversationService;

impl ConversationService {
    /// Create-or-update the summary row for `key` with `last` as the
    /// most recent message.
    ///
    /// Insert-if-absent first; zero rows affected means another writer
    /// got there (now or in the past), and we fall back to updating the
    /// last-message pointer. No existence check runs before the insert,
    /// so two racing first messages cannot observe-then-both-create:
    /// the storage layer's conflict clause arbitrates and exactly one
    /// row exists per key.
    pub async fn touch(
        db: &Pool<Postgres>,
        key: &ConversationKey,
        last: &Message,
    ) -> AppResult<(Conversation, TouchOutcome)> {
        let (low, high) = key.participants();
        let preview = preview_of(&last.body);

        let inserted = sqlx::query(
            "INSERT INTO conversations \
             (conversation_key, participant_low, participant_high, last_message_id, last_message_preview, last_message_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now(), now()) \
             ON CONFLICT (conversation_key) DO NOTHING",
        )
        .bind(key.as_str())
        .bind(low)
        .bind(high)
        .bind(last.id)
        .bind(&preview)
        .bind(last.created_at)
        .execute(db)
        .await?
        .rows_affected();

        let outcome = if inserted > 0 {
            TouchOutcome::Created
        } else {
            sqlx::query(
                "UPDATE conversations \
                 SET last_message_id = $2, last_message_preview = $3, last_message_at = $4, updated_at = now() \
                 WHERE conversation_key = $1",
            )
            .bind(key.as_str())
            .bind(last.id)
            .bind(&preview)
            .bind(last.created_at)
            .execute(db)
            .await?;
            TouchOutcome::Updated
        };

        let row = sqlx::query(
            "SELECT conversation_key, participant_low, participant_high, last_message_id, last_message_preview, last_message_at, created_at, updated_at \
             FROM conversations WHERE conversation_key = $1",
        )
        .bind(key.as_str())
        .fetch_one(db)
        .await?;

        Ok((map_conversation_row(row)?, outcome))
    }

    /// Every conversation the user participates in, each exactly once.
    /// Ordered by recency as a convenience; callers may re-sort.
    pub async fn list_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT conversation_key, participant_low, participant_high, last_message_id, last_message_preview, last_message_at, created_at, updated_at \
             FROM conversations \
             WHERE participant_low = $1 OR participant_high = $1 \
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        rows.into_iter().map(map_conversation_row).collect()
    }
}

/// First line of the body, clipped, for the conversation list UI.
fn preview_of(body: &str) -> String {
    const MAX: usize = 120;
    let line = body.lines().next().unwrap_or_default();
    if line.len() <= MAX {
        line.to_string()
    } else {
        let mut end = MAX;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        line[..end].to_string()
    }
}

fn map_conversation_row(row: PgRow) -> AppResult<Conversation> {
    let key: String = row.get("conversation_key");
    Ok(Conversation {
        conversation_key: ConversationKey::parse(&key)?,
        participant_low: row.get("participant_low"),
        participant_high: row.get("participant_high"),
        last_message_id: row.get("last_message_id"),
        last_message_preview: row.get("last_message_preview"),
        last_message_at: row.get("last_message_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_first_line() {
        assert_eq!(preview_of("hello"), "hello");
        assert_eq!(preview_of("first\nsecond"), "first");
        assert_eq!(preview_of(""), "");
    }

    #[test]
    fn preview_clips_on_char_boundary() {
        let long = "é".repeat(200);
        let clipped = preview_of(&long);
        assert!(clipped.len() <= 120);
        assert!(long.starts_with(&clipped));
    }
}
