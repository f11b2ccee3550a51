//! CoinGecko price oracle for live USD quotes.
//!
//! Quote failures are a valid outcome, not an error: unknown tickers,
//! network failures, and malformed bodies all surface as `None` so the
//! caller can degrade a single report line instead of failing a request.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Map a ticker to its CoinGecko identifier. Expand as new coins are called.
fn feed_id(ticker: &str) -> Option<&'static str> {
    match ticker.to_uppercase().as_str() {
        "BTC" => Some("bitcoin"),
        "ETH" => Some("ethereum"),
        "SOL" => Some("solana"),
        "BNB" => Some("binancecoin"),
        "XRP" => Some("ripple"),
        "DOGE" => Some("dogecoin"),
        _ => None,
    }
}

/// Per-coin quote from the simple-price endpoint.
#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Decimal,
}

/// Client for the CoinGecko simple-price endpoint (read-only).
pub struct PriceOracle {
    client: Client,
    base_url: String,
}

impl PriceOracle {
    /// Create a new oracle client with default settings.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: COINGECKO_API_URL.to_string(),
        })
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the current USD price for a ticker.
    ///
    /// Returns `None` for unmapped tickers (no network access) and for any
    /// request, status, or parse failure. The request is bounded by the
    /// client timeout, so a quote always resolves.
    pub async fn quote(&self, ticker: &str) -> Option<Decimal> {
        let id = feed_id(ticker)?;

        debug!(ticker = %ticker, id = %id, "Fetching quote");

        let response = match self
            .client
            .get(&self.base_url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Quote request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(ticker = %ticker, status = %response.status(), "Quote request rejected");
            return None;
        }

        let body: HashMap<String, SimplePrice> = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Failed to parse quote response");
                return None;
            }
        };

        body.get(id).map(|p| p.usd)
    }
}
