/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// One inbound chat message, as handed to the dispatcher by the transport.
///
/// `sender` is the identifier the authorization gate compares against the
/// configured operator (the chat id rendered as a string).
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub sender: String,
    pub username: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    pub fn from_chat(chat_id: i64, username: Option<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: ChatId(chat_id),
            sender: chat_id.to_string(),
            username,
            text: text.into(),
        }
    }
}
