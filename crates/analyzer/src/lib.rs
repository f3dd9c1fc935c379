//! # Learning Log Analyzer
//!
//! Reads the tuner's learning log back and answers "what happened" and "what worked".
//!
//! ## Public API
//!
//! - `LearningLogReader`: Lenient CSV reader for the log.
//! - `summarize` / `best_record` / `rank` / `stats`: Views over the rows.
//! - `render_summary_table` / `render_stats`: Terminal tables.
//! - `export_training_jsonl`: Prompt/response pairs for fine-tuning.
//! - `AnalyzerError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod export;
pub mod reader;
pub mod render;
pub mod summary;

pub use error::AnalyzerError;
pub use export::export_training_jsonl;
pub use reader::LearningLogReader;
pub use render::{render_stats, render_summary_table};
pub use core_types::RankFilters;
pub use summary::{LogStats, best_record, rank, select, stats, summarize};
