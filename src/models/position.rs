//! Position model: one row per open-or-historical trade call.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Instrument class a position belongs to. SPOT and FUTURES are independent
/// namespaces per ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentClass {
    Spot,
    Futures,
}

impl InstrumentClass {
    /// Canonical form stored in the database and shown to users.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentClass::Spot => "SPOT",
            InstrumentClass::Futures => "FUTURES",
        }
    }

    /// Parse user/database input, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SPOT" => Some(InstrumentClass::Spot),
            "FUTURES" | "FUTURE" => Some(InstrumentClass::Futures),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status. Derived from `remaining_percent`, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    PartiallySold,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::PartiallySold => "PARTIALLY_SOLD",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked trade position.
///
/// `total_position_size` is cumulative units ever bought; partial sells
/// reduce `remaining_percent`, never the size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Surrogate key assigned by the store
    pub id: i64,

    /// Uppercase coin ticker, e.g. "BTC"
    pub ticker: String,

    /// SPOT or FUTURES
    pub instrument_class: InstrumentClass,

    /// Blended cost basis per unit, recomputed on each buy
    pub average_entry_price: Decimal,

    /// Cumulative units bought into the position
    pub total_position_size: Decimal,

    /// Percent of the position not yet sold, 0..=100
    pub remaining_percent: u8,

    /// Link to the announcement that opened the position (display only)
    pub origin_reference: Option<String>,

    /// When the position was opened
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Current status, a pure function of `remaining_percent`.
    pub fn status(&self) -> PositionStatus {
        match self.remaining_percent {
            0 => PositionStatus::Closed,
            100 => PositionStatus::Open,
            _ => PositionStatus::PartiallySold,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.remaining_percent == 0
    }

    /// Blend a new buy into the average entry price (DCA).
    ///
    /// new_avg = (old_avg * old_size + price * size) / (old_size + size)
    pub fn accumulate(&mut self, add_size: Decimal, add_price: Decimal) {
        let total_cost =
            self.average_entry_price * self.total_position_size + add_price * add_size;
        let new_size = self.total_position_size + add_size;

        if !new_size.is_zero() {
            self.average_entry_price = total_cost / new_size;
        }
        self.total_position_size = new_size;
    }

    /// Reduce the remaining percent after a partial sell. The caller has
    /// already validated `percent <= remaining_percent`.
    pub fn sell(&mut self, percent: u8) -> u8 {
        self.remaining_percent = self.remaining_percent.saturating_sub(percent);
        self.remaining_percent
    }

    /// Terminate the position entirely.
    pub fn close(&mut self) {
        self.remaining_percent = 0;
    }

    /// Percent profit/loss of an exit at `price` against the average entry.
    pub fn pnl_percent(&self, price: Decimal) -> Decimal {
        (price - self.average_entry_price) / self.average_entry_price * dec!(100)
    }
}
