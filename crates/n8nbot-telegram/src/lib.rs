//! Telegram adapter (teloxide).
//!
//! Implements the `n8nbot-core` MessagingPort over the Telegram Bot API and runs
//! the long-polling loop that feeds the dispatcher.

use std::{path::Path, time::Duration};

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use n8nbot_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::MessagingPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: &str) -> Self {
        Self::new(Bot::new(token))
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    fn msg_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match retry_delay(&e) {
                    Some(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(retry_after = ?d, "telegram flood control; retrying");
                        sleep(d).await;
                        continue;
                    }
                    _ => return Err(Self::map_err(e)),
                },
            }
        }
    }
}

/// How long Telegram asked us to wait, for flood-control errors only.
fn retry_delay(e: &teloxide::RequestError) -> Option<Duration> {
    match e {
        teloxide::RequestError::RetryAfter(d) => Some(*d),
        _ => None,
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let file = InputFile::file(path.to_path_buf()).file_name(file_name.to_string());
                let mut req = self.bot.send_document(Self::tg_chat(chat_id), file);
                if let Some(c) = caption {
                    req = req.caption(c.to_string()).parse_mode(ParseMode::Html);
                }
                req
            })
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::{ApiError, RequestError};

    #[test]
    fn flood_control_yields_the_requested_delay() {
        let e = RequestError::RetryAfter(Duration::from_secs(7));
        assert_eq!(retry_delay(&e), Some(Duration::from_secs(7)));
    }

    #[test]
    fn other_errors_are_not_retried() {
        let e = RequestError::Api(ApiError::BotBlocked);
        assert_eq!(retry_delay(&e), None);
        assert!(TelegramMessenger::map_err(e)
            .to_string()
            .starts_with("external error: telegram error:"));
    }
}
