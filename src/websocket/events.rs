use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversationKey, Message, MessageKind};

/// Client-to-server websocket events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    #[serde(rename = "send_message")]
    SendMessage {
        receiver_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: Option<MessageKind>,
    },
    #[serde(rename = "join_conversation")]
    JoinConversation { other_user_id: Uuid },
    #[serde(rename = "leave_conversation")]
    LeaveConversation { conversation_id: String },
    #[serde(rename = "typing_start")]
    TypingStart { other_user_id: Uuid },
    #[serde(rename = "typing_stop")]
    TypingStop { other_user_id: Uuid },
}

/// Server-to-client websocket events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    #[serde(rename = "message_sent")]
    MessageSent { message: Message },
    #[serde(rename = "message_received")]
    MessageReceived { message: Message },
    #[serde(rename = "joined_conversation")]
    JoinedConversation { conversation_id: ConversationKey },
    #[serde(rename = "user_typing")]
    UserTyping { user_id: Uuid, is_typing: bool },
    #[serde(rename = "error")]
    Error { message: String },
}
