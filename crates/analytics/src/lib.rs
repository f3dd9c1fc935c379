//! # Tuneloop Analytics
//!
//! Turns whatever a backtest left behind into `BacktestMetrics`: the raw console
//! output, a JSON report, or an exported trade list.
//!
//! ## Architectural Principles
//!
//! - **Pure parsing:** Nothing here runs a backtest. Every function takes text, a JSON
//!   value or a file path and returns numbers, so each parser is tested on fixtures.
//! - **Sentinel over failure:** A metric that cannot be recovered is `Metric::Unparsed`,
//!   never an error. A loop iteration with an unreadable report is still recorded.
//! - **Ordered fallbacks:** Report formats drift between freqtrade releases. Each
//!   metric has a list of patterns or key paths, and the first hit wins.
//!
//! ## Public API
//!
//! - `parse_text_metrics` / `parse_with_debug`: Metrics from raw backtest output.
//! - `parse_json_report` / `locate_report`: The headline numbers of a JSON report.
//! - `summarize_trades_file`: Totals over an exported trade list.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod parser;
pub mod report;
pub mod trades;

pub use error::AnalyticsError;
pub use parser::{parse_summary_table, parse_text_metrics, parse_with_debug};
pub use report::{ReportSummary, load_json_report, locate_report, parse_json_report};
pub use trades::{
    TradeSummary, summarize_trades_csv, summarize_trades_file, summarize_trades_json,
};
