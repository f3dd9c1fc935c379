//! Shared domain types for the tuning loop.
//!
//! Every other crate in the workspace speaks in these types: the parameters that get
//! written into a strategy file, the proposal a model produced, the metrics scraped
//! from a backtest, and the record each iteration leaves behind.

pub mod enums;
pub mod error;
pub mod params;
pub mod ranking;
pub mod structs;
pub mod verification;

// Re-export the core types to provide a clean public API.
pub use enums::{LoopStage, MemoryTier};
pub use error::CoreError;
pub use params::{
    ParameterBounds, ParameterProposal, RoiTable, StrategyParameters, ValueRange,
    decimal_from_value, parse_decimal,
};
pub use ranking::{RankFilters, Ranked, best_of, rank};
pub use structs::{BacktestMetrics, LoopRecord, Metric};
pub use verification::{ResourceThresholds, VerificationSnapshot};
