//! Chat operations for the command line

mod chat;
pub mod client;
mod me;

use anyhow::Result;

pub use chat::{load_chat, read_messages_data, send_message_with_store};

/// List conversations of the signed-in user
pub async fn list_chats(limit: usize) -> Result<()> {
    chat::list_chats(limit).await
}

/// Read messages from a chat
pub async fn read_messages(chat_id: &str, limit: usize, json: bool) -> Result<()> {
    chat::read_messages(chat_id, limit, json).await
}

/// Send a message to a chat
pub async fn send_message(to: &str, message: &str) -> Result<()> {
    chat::send_message(to, message).await
}

/// Show current user info
pub async fn whoami() -> Result<()> {
    me::whoami().await
}
