//! Admin Trade Tracker Bot
//!
//! Telegram bot that lets a single admin narrate spot/futures trade calls
//! in a channel while anyone can query the open portfolio, with live P&L
//! from CoinGecko, in a private chat.

mod api;
mod bot;
mod config;
mod db;
mod dispatch;
mod errors;
mod ledger;
mod models;
mod oracle;
mod portfolio;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bot::{fmt_usd, Bot};
use crate::config::BotSettings;
use crate::db::Database;
use crate::ledger::LedgerEngine;
use crate::oracle::PriceOracle;
use crate::portfolio::{PortfolioFilter, PortfolioReporter, PositionValuation};

/// Trade tracker CLI.
#[derive(Parser)]
#[command(name = "tradetracker")]
#[command(about = "Track an admin's crypto trade calls with live P&L", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./trades.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot
    Run,

    /// Print the open portfolio with live prices (no Telegram needed)
    Portfolio {
        /// Restrict to one instrument class (spot, futures)
        #[arg(short, long)]
        class: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize database
    let db = Arc::new(Database::new(&cli.database).await?);
    let oracle = PriceOracle::new()?;
    let reporter = PortfolioReporter::new(db.clone(), oracle);

    match cli.command {
        Commands::Run => {
            let settings = BotSettings::from_env()?;
            let engine = LedgerEngine::new(db);

            info!(admin = settings.admin_id, "Starting trade tracker bot");
            println!("Trade tracker running. Press Ctrl+C to stop.");

            let bot = Bot::new(&settings, engine, reporter)?;
            bot.run().await?;
        }

        Commands::Portfolio { class } => {
            let filter = match class.as_deref() {
                None => PortfolioFilter::All,
                Some(c) if c.eq_ignore_ascii_case("spot") => PortfolioFilter::Spot,
                Some(c) if c.eq_ignore_ascii_case("futures") => PortfolioFilter::Futures,
                Some(other) => {
                    anyhow::bail!("Unknown class '{}', expected 'spot' or 'futures'", other)
                }
            };

            let snapshot = reporter.snapshot(filter).await?;
            if snapshot.is_empty() {
                println!("No open positions.");
                return Ok(());
            }

            if !snapshot.spot.is_empty() {
                println!("\n=== Spot Positions ===");
                print_valuations(&snapshot.spot);
            }
            if !snapshot.futures.is_empty() {
                println!("\n=== Futures Positions ===");
                print_valuations(&snapshot.futures);
            }
        }
    }

    Ok(())
}

fn print_valuations(entries: &[PositionValuation]) {
    println!(
        "{:<8} {:>6} {:>12} {:>16} {:>16} {:>10}",
        "TICKER", "REM%", "SIZE", "ENTRY", "CURRENT", "PNL"
    );
    println!("{}", "-".repeat(74));

    for entry in entries {
        let current = entry
            .current_price
            .map(|p| format!("${}", fmt_usd(p)))
            .unwrap_or_else(|| "unavailable".to_string());
        let pnl = entry
            .pnl_percent
            .map(|p| {
                let sign = if p >= Decimal::ZERO { "+" } else { "" };
                format!("{}{:.2}%", sign, p.round_dp(2))
            })
            .unwrap_or_else(|| "n/a".to_string());

        println!(
            "{:<8} {:>6} {:>12} {:>16} {:>16} {:>10}",
            entry.ticker,
            entry.remaining_percent,
            entry.total_position_size,
            format!("${}", fmt_usd(entry.average_entry_price)),
            current,
            pnl
        );
    }
}
