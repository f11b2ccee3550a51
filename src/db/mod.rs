//! Database persistence for the position ledger.
//!
//! Pure CRUD over a single `positions` table: no business rules live here.
//! Uniqueness of the open position per (ticker, instrument_class) is
//! guaranteed by the ledger engine's pre-check, not by the store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{InstrumentClass, Position, PositionStatus};

/// Database connection pool for position storage.
pub struct Database {
    pool: SqlitePool,
}

/// Stored position record.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PositionRow {
    id: i64,
    ticker: String,
    instrument_class: String,
    average_entry_price: f64,
    total_position_size: f64,
    #[allow(dead_code)]
    status: String,
    remaining_percent: i64,
    origin_reference: Option<String>,
    opened_at: DateTime<Utc>,
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Position {
            id: row.id,
            instrument_class: InstrumentClass::parse(&row.instrument_class)
                .unwrap_or(InstrumentClass::Spot),
            ticker: row.ticker,
            average_entry_price: Decimal::try_from(row.average_entry_price)
                .unwrap_or(Decimal::ZERO),
            total_position_size: Decimal::try_from(row.total_position_size)
                .unwrap_or(Decimal::ZERO),
            remaining_percent: row.remaining_percent.clamp(0, 100) as u8,
            origin_reference: row.origin_reference,
            opened_at: row.opened_at,
        }
    }
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// In-memory database on a single connection. SQLite gives every new
    /// `:memory:` connection its own empty database, so the pool must not
    /// grow past one.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                instrument_class TEXT NOT NULL,
                average_entry_price REAL NOT NULL,
                total_position_size REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                remaining_percent INTEGER NOT NULL DEFAULT 100,
                origin_reference TEXT,
                opened_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_positions_lookup ON positions(ticker, instrument_class, status)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Positions ====================

    /// Insert a new position with status OPEN and 100% remaining.
    pub async fn create_position(
        &self,
        ticker: &str,
        class: InstrumentClass,
        entry_price: Decimal,
        size: Decimal,
        origin_reference: Option<&str>,
    ) -> Result<i64> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO positions (
                ticker, instrument_class, average_entry_price, total_position_size,
                status, remaining_percent, origin_reference, opened_at, updated_at
            ) VALUES (?, ?, ?, ?, 'OPEN', 100, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(ticker)
        .bind(class.as_str())
        .bind(entry_price.to_f64().unwrap_or(0.0))
        .bind(size.to_f64().unwrap_or(0.0))
        .bind(origin_reference)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert position")?;

        Ok(sqlx::Row::get(&row, "id"))
    }

    /// Find the unique non-CLOSED position for a (ticker, class) pair.
    pub async fn find_open(
        &self,
        ticker: &str,
        class: InstrumentClass,
    ) -> Result<Option<Position>> {
        let row = sqlx::query_as::<_, PositionRow>(
            "SELECT * FROM positions WHERE ticker = ? AND instrument_class = ? AND status != 'CLOSED'",
        )
        .bind(ticker)
        .bind(class.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query open position")?;

        Ok(row.map(Position::from))
    }

    /// Overwrite average price and size after a buy.
    pub async fn update_cost_basis(
        &self,
        id: i64,
        new_avg_price: Decimal,
        new_size: Decimal,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE positions SET average_entry_price = ?, total_position_size = ?, updated_at = ? WHERE id = ?",
        )
        .bind(new_avg_price.to_f64().unwrap_or(0.0))
        .bind(new_size.to_f64().unwrap_or(0.0))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update cost basis")?;

        Ok(())
    }

    /// Overwrite remaining percent and status after a sell or close.
    pub async fn update_exit(
        &self,
        id: i64,
        new_remaining_percent: u8,
        new_status: PositionStatus,
    ) -> Result<()> {
        let now = Utc::now();
        let closed_at = (new_status == PositionStatus::Closed).then_some(now);

        sqlx::query(
            r#"
            UPDATE positions SET
                remaining_percent = ?,
                status = ?,
                closed_at = COALESCE(?, closed_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(new_remaining_percent as i64)
        .bind(new_status.as_str())
        .bind(closed_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update exit state")?;

        Ok(())
    }

    /// All positions with status OPEN or PARTIALLY_SOLD, in insertion order.
    pub async fn list_open(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            "SELECT * FROM positions WHERE status IN ('OPEN', 'PARTIALLY_SOLD') ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list open positions")?;

        Ok(rows.into_iter().map(Position::from).collect())
    }
}
