//! The accounting state machine for trade positions.

mod engine;

pub use engine::{CloseOutcome, DcaOutcome, LedgerEngine, SellOutcome};
