//! # Backtester
//!
//! Runs the external backtesting framework as a subprocess. This crate does not
//! simulate anything itself; it builds a command line, waits for the process and hands
//! back whatever it printed.
//!
//! ## Public API
//!
//! - `BacktestRunner`: the async seam the tuning loop drives.
//! - `FreqtradeRunner`: the `freqtrade backtesting` implementation.
//! - `extract_summary`: the summary-table excerpt written to the result log.

use crate::error::BacktestError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub mod freqtrade;
pub mod summary;

pub use freqtrade::FreqtradeRunner;
pub use summary::extract_summary;

/// Everything that varies between two backtest invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktestRequest {
    pub config_path: PathBuf,
    pub strategy_name: String,
    pub strategy_dir: PathBuf,
    pub timeframe: String,
    /// `YYYYMMDD-YYYYMMDD`, either side may be empty.
    pub timerange: String,
    pub export_trades: bool,
    pub export_filename: Option<PathBuf>,
    pub verbosity: u8,
}

/// What one backtest process left behind.
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    /// True exactly when the process exited with status 0.
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// The interface for anything that can run a backtest.
///
/// Implementations report a failed run (non-zero exit, timeout, missing executable)
/// as an `Ok` outcome with `success == false`; `Err` is reserved for failures of the
/// runner itself.
#[async_trait]
pub trait BacktestRunner: Send + Sync {
    /// Gets whatever the runs need (candle data) in place. Best effort: `false` means
    /// preparation failed and the runs may fail too.
    async fn prepare(&self, _request: &BacktestRequest) -> bool {
        true
    }

    async fn run(&self, request: &BacktestRequest) -> Result<BacktestOutcome, BacktestError>;
}
