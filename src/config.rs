//! Bot settings loaded from the environment (.env supported via dotenvy).

use anyhow::{Context, Result};

/// Secrets and identity the bot needs at runtime.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Bot token from BotFather
    pub telegram_token: String,

    /// Telegram user id of the single administrator
    pub admin_id: i64,
}

impl BotSettings {
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            std::env::var("TELEGRAM_BOT_API_KEY").context("TELEGRAM_BOT_API_KEY not set")?;
        let admin_id: i64 = std::env::var("ADMIN_ID")
            .context("ADMIN_ID not set")?
            .parse()
            .context("Invalid ADMIN_ID")?;

        Ok(Self {
            telegram_token,
            admin_id,
        })
    }
}
