//! Telegram update handlers.
//!
//! Converts text messages into `IncomingMessage`s for the core dispatcher. The
//! authorization gate lives in the dispatcher, not here.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use n8nbot_core::{dispatcher::Dispatcher, domain::IncomingMessage};

pub async fn handle_message(msg: Message, dispatcher: Arc<Dispatcher>) -> ResponseResult<()> {
    if let Some(incoming) = incoming(&msg) {
        dispatcher.handle(incoming).await;
    }
    Ok(())
}

/// `None` for photos, stickers and the like: they carry no command.
fn incoming(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text()?;
    let username = msg.from().and_then(|u| u.username.clone());
    Some(IncomingMessage::from_chat(msg.chat.id.0, username, text))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use n8nbot_core::domain::ChatId;
    use serde_json::json;
    use teloxide::types::Update;

    const CHAT: i64 = 111;
    const USER: u64 = 999;

    fn message_json(body: serde_json::Value) -> serde_json::Value {
        let mut msg = json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": { "id": CHAT, "type": "private", "first_name": "Op" },
            "from": { "id": USER, "is_bot": false, "first_name": "Op", "username": "op" },
        });
        if let (Some(m), Some(b)) = (msg.as_object_mut(), body.as_object()) {
            m.extend(b.clone());
        }
        msg
    }

    pub(crate) fn update(body: serde_json::Value) -> Update {
        serde_json::from_value(json!({ "update_id": 1, "message": message_json(body) })).unwrap()
    }

    fn message(body: serde_json::Value) -> Message {
        serde_json::from_value(message_json(body)).unwrap()
    }

    #[test]
    fn text_message_uses_chat_id_as_sender() {
        let incoming = incoming(&message(json!({ "text": "/status" }))).unwrap();
        assert_eq!(incoming.chat_id, ChatId(CHAT));
        assert_eq!(incoming.sender, CHAT.to_string());
        assert_ne!(incoming.sender, USER.to_string());
        assert_eq!(incoming.username.as_deref(), Some("op"));
        assert_eq!(incoming.text, "/status");
    }

    #[test]
    fn messages_without_text_are_skipped() {
        let located = message(json!({ "location": { "latitude": 52.5, "longitude": 13.4 } }));
        assert!(incoming(&located).is_none());
    }
}
