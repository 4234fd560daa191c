//! Outbound messaging port (Telegram today).

use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Hexagonal port for replying to the operator.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Upload a local file as a chat attachment. `caption` is HTML.
    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<MessageRef>;
}
