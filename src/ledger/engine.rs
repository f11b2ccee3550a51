//! Ledger engine: open, accumulate (DCA), partial sell, and close.
//!
//! Every write is a read-modify-write over the position store. Each
//! operation holds a per-(ticker, instrument_class) mutex for its whole
//! read-compute-write span, so a second command against the same pair
//! serializes behind the first instead of clobbering its update.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use crate::db::Database;
use crate::errors::LedgerError;
use crate::models::{InstrumentClass, Position};

type PositionKey = (String, InstrumentClass);

/// Result of an accumulate (buy) operation.
#[derive(Debug, Clone)]
pub struct DcaOutcome {
    pub new_average_price: Decimal,
    pub new_total_size: Decimal,
}

/// Result of a partial sell.
#[derive(Debug, Clone)]
pub struct SellOutcome {
    pub sold_percent: u8,
    pub remaining_percent: u8,
    pub pnl_percent: Decimal,
    pub closed: bool,
}

/// Result of a full close.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub pnl_percent: Decimal,
}

/// The position ledger state machine.
pub struct LedgerEngine {
    db: Arc<Database>,

    // One mutex per (ticker, class) pair, created on first use
    key_locks: Mutex<HashMap<PositionKey, Arc<Mutex<()>>>>,
}

impl LedgerEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock guarding all writes for one (ticker, class) pair.
    async fn key_lock(&self, ticker: &str, class: InstrumentClass) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry((ticker.to_string(), class))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Open a new position. Fails with `AlreadyOpen` if a non-closed
    /// position already exists for the (ticker, class) pair.
    pub async fn open_position(
        &self,
        ticker: &str,
        class: InstrumentClass,
        entry_price: Decimal,
        size: Decimal,
        origin_reference: Option<&str>,
    ) -> Result<Position, LedgerError> {
        if entry_price <= Decimal::ZERO || size <= Decimal::ZERO {
            return Err(LedgerError::InvalidArguments(
                "price and size must be positive".to_string(),
            ));
        }

        let ticker = ticker.to_uppercase();
        let lock = self.key_lock(&ticker, class).await;
        let _guard = lock.lock().await;

        if let Some(existing) = self.db.find_open(&ticker, class).await? {
            return Err(LedgerError::AlreadyOpen {
                ticker: existing.ticker,
                class,
            });
        }

        let id = self
            .db
            .create_position(&ticker, class, entry_price, size, origin_reference)
            .await?;

        info!(ticker = %ticker, class = %class, price = %entry_price, size = %size, "Opened position");

        Ok(Position {
            id,
            ticker,
            instrument_class: class,
            average_entry_price: entry_price,
            total_position_size: size,
            remaining_percent: 100,
            origin_reference: origin_reference.map(String::from),
            opened_at: chrono::Utc::now(),
        })
    }

    /// Buy more of an open position, blending the average entry price.
    pub async fn accumulate(
        &self,
        class: InstrumentClass,
        ticker: &str,
        add_size: Decimal,
        add_price: Decimal,
    ) -> Result<DcaOutcome, LedgerError> {
        if add_price <= Decimal::ZERO || add_size <= Decimal::ZERO {
            return Err(LedgerError::InvalidArguments(
                "amount and price must be positive".to_string(),
            ));
        }

        let ticker = ticker.to_uppercase();
        let lock = self.key_lock(&ticker, class).await;
        let _guard = lock.lock().await;

        let mut pos = self.require_open(&ticker, class).await?;
        pos.accumulate(add_size, add_price);

        self.db
            .update_cost_basis(pos.id, pos.average_entry_price, pos.total_position_size)
            .await?;

        info!(
            ticker = %ticker,
            class = %class,
            new_avg = %pos.average_entry_price,
            new_size = %pos.total_position_size,
            "Accumulated position"
        );

        Ok(DcaOutcome {
            new_average_price: pos.average_entry_price,
            new_total_size: pos.total_position_size,
        })
    }

    /// Sell a percentage of an open position at `exit_price`.
    ///
    /// The realized P&L is reported, not persisted; the ledger tracks only
    /// current state.
    pub async fn partial_sell(
        &self,
        class: InstrumentClass,
        ticker: &str,
        percent: u8,
        exit_price: Decimal,
    ) -> Result<SellOutcome, LedgerError> {
        if !(1..=100).contains(&percent) {
            return Err(LedgerError::InvalidArguments(
                "percentage must be between 1 and 100".to_string(),
            ));
        }
        if exit_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidArguments(
                "price must be positive".to_string(),
            ));
        }

        let ticker = ticker.to_uppercase();
        let lock = self.key_lock(&ticker, class).await;
        let _guard = lock.lock().await;

        let mut pos = self.require_open(&ticker, class).await?;

        if percent > pos.remaining_percent {
            return Err(LedgerError::InsufficientRemaining {
                requested: percent,
                remaining: pos.remaining_percent,
            });
        }

        let pnl_percent = pos.pnl_percent(exit_price);
        let remaining = pos.sell(percent);

        self.db.update_exit(pos.id, remaining, pos.status()).await?;

        info!(
            ticker = %ticker,
            class = %class,
            sold = percent,
            remaining = remaining,
            pnl = %pnl_percent,
            "Sold part of position"
        );

        Ok(SellOutcome {
            sold_percent: percent,
            remaining_percent: remaining,
            pnl_percent,
            closed: pos.is_closed(),
        })
    }

    /// Close the entire remaining position at `exit_price`.
    pub async fn close_position(
        &self,
        class: InstrumentClass,
        ticker: &str,
        exit_price: Decimal,
    ) -> Result<CloseOutcome, LedgerError> {
        if exit_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidArguments(
                "price must be positive".to_string(),
            ));
        }

        let ticker = ticker.to_uppercase();
        let lock = self.key_lock(&ticker, class).await;
        let _guard = lock.lock().await;

        let mut pos = self.require_open(&ticker, class).await?;

        let pnl_percent = pos.pnl_percent(exit_price);
        pos.close();

        self.db.update_exit(pos.id, 0, pos.status()).await?;

        info!(ticker = %ticker, class = %class, pnl = %pnl_percent, "Closed position");

        Ok(CloseOutcome { pnl_percent })
    }

    async fn require_open(
        &self,
        ticker: &str,
        class: InstrumentClass,
    ) -> Result<Position, LedgerError> {
        self.db
            .find_open(ticker, class)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                ticker: ticker.to_string(),
                class,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionStatus;
    use rust_decimal_macros::dec;

    async fn test_engine() -> LedgerEngine {
        let db = Database::in_memory().await.expect("in-memory db");
        LedgerEngine::new(Arc::new(db))
    }

    #[tokio::test]
    async fn test_open_rejects_duplicate() {
        let engine = test_engine().await;

        engine
            .open_position("BTC", InstrumentClass::Spot, dec!(50000), dec!(1), None)
            .await
            .unwrap();

        // Case-insensitive on the ticker: still the same key
        let err = engine
            .open_position("btc", InstrumentClass::Spot, dec!(51000), dec!(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyOpen { .. }));

        // A different class is an independent namespace
        engine
            .open_position("BTC", InstrumentClass::Futures, dec!(50000), dec!(1), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_non_positive_inputs() {
        let engine = test_engine().await;

        let err = engine
            .open_position("BTC", InstrumentClass::Spot, dec!(0), dec!(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArguments(_)));

        let err = engine
            .open_position("BTC", InstrumentClass::Spot, dec!(50000), dec!(-1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_dca_correctness() {
        let engine = test_engine().await;

        engine
            .open_position("ETH", InstrumentClass::Spot, dec!(100), dec!(1), None)
            .await
            .unwrap();

        let outcome = engine
            .accumulate(InstrumentClass::Spot, "ETH", dec!(1), dec!(200))
            .await
            .unwrap();

        assert_eq!(outcome.new_average_price, dec!(150));
        assert_eq!(outcome.new_total_size, dec!(2));
    }

    #[tokio::test]
    async fn test_accumulate_requires_open_position() {
        let engine = test_engine().await;

        let err = engine
            .accumulate(InstrumentClass::Spot, "ETH", dec!(1), dec!(200))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sell_boundary_leaves_state_unchanged() {
        let engine = test_engine().await;

        engine
            .open_position("SOL", InstrumentClass::Spot, dec!(100), dec!(10), None)
            .await
            .unwrap();
        engine
            .partial_sell(InstrumentClass::Spot, "SOL", 60, dec!(120))
            .await
            .unwrap();

        let err = engine
            .partial_sell(InstrumentClass::Spot, "SOL", 50, dec!(120))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientRemaining {
                requested: 50,
                remaining: 40
            }
        ));

        // State unchanged by the failed sell
        let pos = engine
            .require_open("SOL", InstrumentClass::Spot)
            .await
            .unwrap();
        assert_eq!(pos.remaining_percent, 40);
    }

    #[tokio::test]
    async fn test_sell_percent_out_of_range() {
        let engine = test_engine().await;

        engine
            .open_position("SOL", InstrumentClass::Spot, dec!(100), dec!(10), None)
            .await
            .unwrap();

        let err = engine
            .partial_sell(InstrumentClass::Spot, "SOL", 0, dec!(120))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_close_pnl_formula() {
        let engine = test_engine().await;

        engine
            .open_position("BNB", InstrumentClass::Futures, dec!(100), dec!(5), None)
            .await
            .unwrap();

        let outcome = engine
            .close_position(InstrumentClass::Futures, "BNB", dec!(110))
            .await
            .unwrap();
        assert_eq!(outcome.pnl_percent.round_dp(2), dec!(10.00));
    }

    #[tokio::test]
    async fn test_closed_position_is_terminal() {
        let engine = test_engine().await;

        engine
            .open_position("XRP", InstrumentClass::Spot, dec!(2), dec!(1000), None)
            .await
            .unwrap();
        engine
            .close_position(InstrumentClass::Spot, "XRP", dec!(3))
            .await
            .unwrap();

        let err = engine
            .accumulate(InstrumentClass::Spot, "XRP", dec!(100), dec!(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));

        let err = engine
            .partial_sell(InstrumentClass::Spot, "XRP", 10, dec!(3))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));

        let err = engine
            .close_position(InstrumentClass::Spot, "XRP", dec!(3))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));

        // Reopening after close is allowed
        engine
            .open_position("XRP", InstrumentClass::Spot, dec!(2.5), dec!(500), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        let engine = test_engine().await;

        engine
            .open_position("BTC", InstrumentClass::Spot, dec!(50000), dec!(1.0), None)
            .await
            .unwrap();

        let dca = engine
            .accumulate(InstrumentClass::Spot, "BTC", dec!(1.0), dec!(40000))
            .await
            .unwrap();
        assert_eq!(dca.new_average_price, dec!(45000));
        assert_eq!(dca.new_total_size, dec!(2.0));

        let sell = engine
            .partial_sell(InstrumentClass::Spot, "BTC", 50, dec!(60000))
            .await
            .unwrap();
        assert_eq!(sell.remaining_percent, 50);
        assert!(!sell.closed);
        assert_eq!(sell.pnl_percent.round_dp(2), dec!(33.33));

        let pos = engine
            .require_open("BTC", InstrumentClass::Spot)
            .await
            .unwrap();
        assert_eq!(pos.status(), PositionStatus::PartiallySold);
        // Cumulative size is not reduced by the sell
        assert_eq!(pos.total_position_size, dec!(2.0));

        let close = engine
            .close_position(InstrumentClass::Spot, "BTC", dec!(70000))
            .await
            .unwrap();
        assert_eq!(close.pnl_percent.round_dp(2), dec!(55.56));

        let err = engine
            .require_open("BTC", InstrumentClass::Spot)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_uniqueness_after_operation_sequences() {
        let engine = test_engine().await;

        for _ in 0..3 {
            engine
                .open_position("DOGE", InstrumentClass::Spot, dec!(0.1), dec!(10000), None)
                .await
                .unwrap();
            engine
                .partial_sell(InstrumentClass::Spot, "DOGE", 100, dec!(0.2))
                .await
                .unwrap();
        }

        // Selling 100% closes, so each reopen found no live position
        let open = engine.db.list_open().await.unwrap();
        assert!(open.is_empty());
    }
}
