//! Typed errors for ledger operations.

use crate::models::InstrumentClass;

/// Failure modes of the ledger engine. All of these are recovered at the
/// command boundary and rendered as a reply; none terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("a {class} position for ${ticker} is already open")]
    AlreadyOpen {
        ticker: String,
        class: InstrumentClass,
    },

    #[error("no open {class} position for ${ticker}")]
    NotFound {
        ticker: String,
        class: InstrumentClass,
    },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("cannot sell {requested}%, only {remaining}% remaining")]
    InsufficientRemaining { requested: u8, remaining: u8 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Storage(e.into())
    }
}
