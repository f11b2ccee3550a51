//! Telegram Bot API client and wire types.

mod telegram;
mod types;

pub use telegram::TelegramClient;
pub use types::{Chat, Message, Update, User};
