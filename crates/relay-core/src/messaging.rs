use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// Port for delivering a reply to a chat.
#[async_trait]
pub trait ReplyPort: Send + Sync {
    /// Send plain text. Returns the raw response body, for logging only.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<String>;
}
