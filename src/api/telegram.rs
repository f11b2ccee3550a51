//! Thin Telegram Bot API client: long-poll update intake and replies.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use super::types::{ApiResponse, SendMessageParams, Update};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Long-poll window for getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Client timeout; must outlast the long-poll window.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 10);

/// Client for one bot token.
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    /// Create a client for the given bot token.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(format!("{}/bot{}", TELEGRAM_API_BASE, token))
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let mut url = format!(
            "{}/getUpdates?timeout={}",
            self.base_url, POLL_TIMEOUT_SECS
        );
        if let Some(o) = offset {
            url = format!("{}&offset={}", url, o);
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch updates")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("getUpdates failed: {} - {}", status, body);
        }

        let envelope: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .context("Failed to parse updates response")?;

        if !envelope.ok {
            anyhow::bail!(
                "getUpdates rejected: {}",
                envelope.description.unwrap_or_default()
            );
        }

        let updates = envelope.result.unwrap_or_default();
        debug!(count = updates.len(), "Fetched updates");

        Ok(updates)
    }

    /// Send a Markdown reply into a chat. Link previews are disabled so
    /// origin links stay compact.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        let params = SendMessageParams {
            chat_id,
            text,
            parse_mode: Some("Markdown"),
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&params)
            .send()
            .await
            .context("Failed to send message")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("sendMessage failed: {} - {}", status, body);
        }

        Ok(())
    }
}
