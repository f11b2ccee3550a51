//! Portfolio reporter: merges open positions with live oracle quotes.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use rust_decimal::Decimal;

use crate::db::Database;
use crate::models::{InstrumentClass, Position};
use crate::oracle::PriceOracle;

/// Which instrument classes a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortfolioFilter {
    All,
    Spot,
    Futures,
}

impl PortfolioFilter {
    pub fn includes(&self, class: InstrumentClass) -> bool {
        match self {
            PortfolioFilter::All => true,
            PortfolioFilter::Spot => class == InstrumentClass::Spot,
            PortfolioFilter::Futures => class == InstrumentClass::Futures,
        }
    }
}

/// One open position valued against the live feed.
///
/// `current_price` and `pnl_percent` are `None` when the oracle could not
/// produce a quote; the entry is still reported.
#[derive(Debug, Clone)]
pub struct PositionValuation {
    pub ticker: String,
    pub remaining_percent: u8,
    pub total_position_size: Decimal,
    pub average_entry_price: Decimal,
    pub current_price: Option<Decimal>,
    pub pnl_percent: Option<Decimal>,
    pub origin_reference: Option<String>,
}

impl PositionValuation {
    /// Value a position against an optional live quote.
    fn new(position: &Position, quote: Option<Decimal>) -> Self {
        Self {
            ticker: position.ticker.clone(),
            remaining_percent: position.remaining_percent,
            total_position_size: position.total_position_size,
            average_entry_price: position.average_entry_price,
            current_price: quote,
            pnl_percent: quote.map(|price| position.pnl_percent(price)),
            origin_reference: position.origin_reference.clone(),
        }
    }
}

/// Valuation snapshot grouped by instrument class, SPOT first.
#[derive(Debug, Clone, Default)]
pub struct PortfolioSnapshot {
    pub spot: Vec<PositionValuation>,
    pub futures: Vec<PositionValuation>,
}

impl PortfolioSnapshot {
    /// True when there is nothing to report for the requested filter.
    pub fn is_empty(&self) -> bool {
        self.spot.is_empty() && self.futures.is_empty()
    }
}

/// Composes ledger state with live prices into user-facing snapshots.
pub struct PortfolioReporter {
    db: Arc<Database>,
    oracle: PriceOracle,
}

impl PortfolioReporter {
    pub fn new(db: Arc<Database>, oracle: PriceOracle) -> Self {
        Self { db, oracle }
    }

    /// Build a valuation snapshot of all open positions matching `filter`.
    ///
    /// Quotes are fetched concurrently, one per position; a failed quote
    /// degrades that entry only.
    pub async fn snapshot(&self, filter: PortfolioFilter) -> Result<PortfolioSnapshot> {
        let positions: Vec<Position> = self
            .db
            .list_open()
            .await?
            .into_iter()
            .filter(|p| filter.includes(p.instrument_class))
            .collect();

        let quotes = join_all(positions.iter().map(|p| self.oracle.quote(&p.ticker))).await;

        let mut snapshot = PortfolioSnapshot::default();
        for (position, quote) in positions.iter().zip(quotes) {
            let entry = PositionValuation::new(position, quote);
            match position.instrument_class {
                InstrumentClass::Spot => snapshot.spot.push(entry),
                InstrumentClass::Futures => snapshot.futures.push(entry),
            }
        }

        Ok(snapshot)
    }
}
