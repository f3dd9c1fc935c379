//! # Walk-Forward Validation
//!
//! Splits a date range into rolling train/test windows, tunes on each training window
//! and checks the winning parameters on the window that follows it.
//!
//! ## Public API
//!
//! - `generate_periods` / `render_periods`: Period generation and bash/JSON/CSV listings.
//! - `WalkForward`: The driver that runs the tuner and the out-of-sample backtests.
//! - `summarize_walks` / `best_record`: Aggregation over walks and iterations.
//! - `WfoError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod period;
pub mod walk;

pub use error::WfoError;
pub use period::{DATE_FORMAT, PeriodFormat, WalkPeriod, generate_periods, parse_date, render_periods};
pub use walk::{WalkForward, WalkResult, WalkSummary, best_record, summarize_walks};
