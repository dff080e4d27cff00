use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation_key::ConversationKey;

/// Summary row for one two-party conversation. Created lazily by the
/// first message between the pair; afterwards only the last-message
/// pointer and `updated_at` change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_key: ConversationKey,
    pub participant_low: Uuid,
    pub participant_high: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
