pub mod conversation;
pub mod conversation_key;
pub mod message;

pub use conversation::Conversation;
pub use conversation_key::ConversationKey;
pub use message::{Message, MessageKind};
