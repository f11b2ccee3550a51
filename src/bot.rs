//! Bot runner: long-poll loop wiring transport, dispatch, and ledger.
//!
//! Every engine error is recovered here and turned into a reply; nothing a
//! user sends can take the process down. Storage failures abort the single
//! in-flight command and are reported generically.

use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::api::{Message, TelegramClient};
use crate::config::BotSettings;
use crate::dispatch::{self, AccessDenied, ChatKind, Command, CommandOrigin, ParseError};
use crate::errors::LedgerError;
use crate::ledger::LedgerEngine;
use crate::models::InstrumentClass;
use crate::portfolio::{PortfolioFilter, PortfolioReporter, PositionValuation};

const GREETING: &str = "👋 Welcome to the Admin Trade Tracker!\n\n\
    I help track the admin's crypto trades.\n\
    To see the current portfolio, send me one of these commands:\n\
    🔹 /portfolio_all - View all open positions\n\
    🔹 /portfolio_spot - View only Spot positions\n\
    🔹 /portfolio_futures - View only Futures positions";

/// Long-poll bot over one Telegram token.
pub struct Bot {
    telegram: TelegramClient,
    engine: LedgerEngine,
    reporter: PortfolioReporter,
    admin_id: i64,
}

impl Bot {
    pub fn new(
        settings: &BotSettings,
        engine: LedgerEngine,
        reporter: PortfolioReporter,
    ) -> Result<Self> {
        Ok(Self {
            telegram: TelegramClient::new(&settings.telegram_token)?,
            engine,
            reporter,
            admin_id: settings.admin_id,
        })
    }

    /// Run until Ctrl-C. Poll errors are logged and retried; a broken
    /// network never stops the loop.
    pub async fn run(&self) -> Result<()> {
        info!("Starting update loop");

        let mut offset: Option<i64> = None;

        loop {
            let updates = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
                result = self.telegram.get_updates(offset) => match result {
                    Ok(updates) => updates,
                    Err(e) => {
                        error!(error = %e, "Failed to fetch updates");
                        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                        continue;
                    }
                },
            };

            for update in updates {
                offset = Some(update.update_id + 1);

                if let Some(message) = update.effective_message() {
                    if let Some(reply) = self.handle_message(message).await {
                        if let Err(e) = self.telegram.send_message(message.chat.id, &reply).await {
                            warn!(chat = message.chat.id, error = %e, "Failed to send reply");
                        }
                    }
                }
            }
        }
    }

    /// Process one inbound message; returns the reply text, if any.
    async fn handle_message(&self, message: &Message) -> Option<String> {
        let text = message.text.as_deref()?;

        let command = match dispatch::parse(text) {
            Ok(command) => command,
            Err(ParseError::NotACommand) | Err(ParseError::Unrecognized) => return None,
            Err(ParseError::InvalidFormat { usage }) => {
                return Some(format!("❌ Invalid format. Use: {}", usage));
            }
        };

        let origin = CommandOrigin {
            chat_kind: ChatKind::from_api(&message.chat.kind),
            sender_id: message.from.as_ref().map(|u| u.id),
        };

        if let Err(denied) = dispatch::authorize(&command, origin, self.admin_id) {
            debug!(command = ?command, reason = %denied, "Command rejected by access policy");
            return Some(match denied {
                AccessDenied::AdminChatOnly => {
                    "Please use trade management commands in the main channel.".to_string()
                }
                AccessDenied::NotAdmin => "Sorry, this command is for the admin only.".to_string(),
                AccessDenied::PrivateChatOnly => {
                    "This command is only available in a private message with me.".to_string()
                }
            });
        }

        Some(self.execute(command, message).await)
    }

    /// Run an authorized command against the engine or reporter.
    async fn execute(&self, command: Command, message: &Message) -> String {
        match command {
            Command::Start => GREETING.to_string(),

            Command::NewTrade {
                class,
                ticker,
                price,
                size,
            } => {
                let origin_reference = message.link();
                match self
                    .engine
                    .open_position(&ticker, class, price, size, origin_reference.as_deref())
                    .await
                {
                    Ok(position) => format!(
                        "✅ New {} trade opened for ${}.\nEntry Price: ${}\nSize: {}",
                        class,
                        position.ticker,
                        fmt_usd(price),
                        size
                    ),
                    Err(e) => self.render_error(e),
                }
            }

            Command::Buy {
                class,
                ticker,
                size,
                price,
            } => match self.engine.accumulate(class, &ticker, size, price).await {
                Ok(outcome) => format!(
                    "🟢 Bought more ${} ({}).\nNew Average Entry: ${}\nNew Total Size: {}",
                    ticker,
                    class,
                    fmt_usd(outcome.new_average_price),
                    outcome.new_total_size
                ),
                Err(e) => self.render_error(e),
            },

            Command::Sell {
                class,
                ticker,
                percent,
                price,
            } => match self.engine.partial_sell(class, &ticker, percent, price).await {
                Ok(outcome) if outcome.closed => format!(
                    "💰 Closed final part of ${} at ${} for a ~{:.2}% profit. Position is now fully closed.",
                    ticker,
                    fmt_usd(price),
                    outcome.pnl_percent.round_dp(2)
                ),
                Ok(outcome) => format!(
                    "💰 Sold {}% of ${} at ${} for a ~{:.2}% profit.\n{}% of the position remains open.",
                    outcome.sold_percent,
                    ticker,
                    fmt_usd(price),
                    outcome.pnl_percent.round_dp(2),
                    outcome.remaining_percent
                ),
                Err(e) => self.render_error(e),
            },

            Command::Close {
                class,
                ticker,
                price,
            } => match self.engine.close_position(class, &ticker, price).await {
                Ok(outcome) => format!(
                    "❌ Trade Closed for ${} ({}).\nClosed at: ${}\nFinal PNL: {:.2}%",
                    ticker,
                    class,
                    fmt_usd(price),
                    outcome.pnl_percent.round_dp(2)
                ),
                Err(e) => self.render_error(e),
            },

            Command::Portfolio(filter) => match self.reporter.snapshot(filter).await {
                Ok(snapshot) if snapshot.is_empty() => match filter {
                    PortfolioFilter::All => {
                        "The admin has no open positions right now. 🤷‍♂️".to_string()
                    }
                    PortfolioFilter::Spot => "No open Spot positions found.".to_string(),
                    PortfolioFilter::Futures => "No open Futures positions found.".to_string(),
                },
                Ok(snapshot) => render_snapshot(&snapshot.spot, &snapshot.futures),
                Err(e) => {
                    error!(error = %e, "Portfolio snapshot failed");
                    "⚠️ Something went wrong. Please try again.".to_string()
                }
            },
        }
    }

    fn render_error(&self, error: LedgerError) -> String {
        match error {
            LedgerError::AlreadyOpen { ticker, class } => {
                format!("⚠️ A {} trade for ${} is already open.", class, ticker)
            }
            LedgerError::NotFound { ticker, class } => {
                format!("🤷 No open {} trade found for ${}.", class, ticker)
            }
            LedgerError::InvalidArguments(reason) => format!("❌ Invalid arguments: {}.", reason),
            LedgerError::InsufficientRemaining {
                requested,
                remaining,
            } => format!(
                "❌ Cannot sell {}%. Only {}% remaining.",
                requested, remaining
            ),
            LedgerError::Storage(e) => {
                error!(error = %e, "Storage failure");
                "⚠️ Something went wrong. Please try again.".to_string()
            }
        }
    }
}

/// Render the grouped portfolio, SPOT first, in the channel's message style.
fn render_snapshot(spot: &[PositionValuation], futures: &[PositionValuation]) -> String {
    let mut parts = Vec::new();

    if !spot.is_empty() {
        parts.push("--- 🟢 Admin's Open Spot Positions 🟢 ---".to_string());
        for entry in spot {
            parts.push(render_entry(entry, InstrumentClass::Spot));
        }
    }

    if !futures.is_empty() {
        parts.push("--- 🔵 Admin's Open Futures Positions 🔵 ---".to_string());
        for entry in futures {
            parts.push(render_entry(entry, InstrumentClass::Futures));
        }
    }

    parts.join("\n\n")
}

fn render_entry(entry: &PositionValuation, class: InstrumentClass) -> String {
    let (emoji, price_line, pnl_line) = match (entry.current_price, entry.pnl_percent) {
        (Some(price), Some(pnl)) => {
            let emoji = if pnl >= Decimal::ZERO { "📈" } else { "📉" };
            let sign = if pnl >= Decimal::ZERO { "+" } else { "" };
            (
                emoji,
                format!("${}", fmt_usd(price)),
                format!("{}{:.2}%", sign, pnl.round_dp(2)),
            )
        }
        _ => ("⚠️", "Price Error".to_string(), "N/A".to_string()),
    };

    let header = match class {
        InstrumentClass::Spot => format!(
            "{} Coin: ${} ({}% Remaining)",
            emoji, entry.ticker, entry.remaining_percent
        ),
        InstrumentClass::Futures => format!("{} Coin: ${}", emoji, entry.ticker),
    };

    let mut lines = vec![
        header,
        format!("   Entry: ${} (Avg)", fmt_usd(entry.average_entry_price)),
        format!("   Current: {}", price_line),
        format!("   PNL: {}", pnl_line),
    ];

    if let Some(link) = &entry.origin_reference {
        lines.push(format!("   Post: [Original Call]({})", link));
    }

    lines.join("\n")
}

/// Format a USD amount with thousands separators and two decimals.
pub fn fmt_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let raw = format!("{:.2}", rounded);

    let (sign, digits) = raw.strip_prefix('-').map_or(("", raw.as_str()), |d| ("-", d));
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}{}.{}", sign, grouped, frac)
}
