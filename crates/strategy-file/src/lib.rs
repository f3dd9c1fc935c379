//! # Strategy File
//!
//! Owns the one piece of source text the tuning loop edits: a freqtrade strategy.
//!
//! ## Architectural Principles
//!
//! - **Narrow substitution:** only the `minimal_roi` and `stoploss` assignments are
//!   rewritten, via patterns; the rest of the file is never parsed or reformatted.
//! - **Loud failure:** a missing assignment is an error. Silently skipping it would let
//!   the loop believe in parameters the file does not contain.
//!
//! ## Public API
//!
//! - `StrategyFile`: ensure the baseline, mutate, read back.
//! - `PatchManager`: backup, apply a suggested diff or replacement, roll back.
//! - `save_from_reply` / `write_generated`: a whole new strategy from a model reply.

pub mod baseline;
pub mod error;
pub mod generate;
pub mod mutator;
pub mod patch;

pub use baseline::baseline_strategy;
pub use error::StrategyFileError;
pub use generate::{
    DEFAULT_CLASS_NAME, GeneratedStrategy, extract_python_block, save_from_reply,
    strategy_class_name, write_generated,
};
pub use mutator::{StrategyFile, parse_source, rewrite_source};
pub use patch::{PatchManager, PatchOutcome, is_unified_diff, sanitize_patch};
