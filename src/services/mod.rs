pub mod chat_service;
pub mod conversation_service;
pub mod message_service;
