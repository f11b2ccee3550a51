//! Wire types for the Telegram Bot API (only the fields this bot reads).

use serde::{Deserialize, Serialize};

/// Standard Telegram response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One update from getUpdates. Commands arrive either as group/private
/// messages or as channel posts.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
}

impl Update {
    /// The message carried by this update, whatever chat kind produced it.
    pub fn effective_message(&self) -> Option<&Message> {
        self.message.as_ref().or(self.channel_post.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

impl Message {
    /// Public link to this message, when one can be derived.
    ///
    /// Public chats link as t.me/<username>/<id>; private supergroups and
    /// channels (chat ids prefixed -100) as t.me/c/<internal-id>/<id>.
    pub fn link(&self) -> Option<String> {
        if let Some(username) = &self.chat.username {
            return Some(format!("https://t.me/{}/{}", username, self.message_id));
        }

        let chat_id = self.chat.id.to_string();
        chat_id
            .strip_prefix("-100")
            .map(|internal| format!("https://t.me/c/{}/{}", internal, self.message_id))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Body for sendMessage.
#[derive(Debug, Serialize)]
pub struct SendMessageParams<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'a str>,
    pub disable_web_page_preview: bool,
}
