//! Data models for positions and their lifecycle.

mod position;

pub use position::{InstrumentClass, Position, PositionStatus};
