//! # Tuneloop Tuner
//!
//! The self-improving loop: ask a model for parameters, write them into the strategy,
//! backtest, read the results back, log them and remember them for the next prompt.
//!
//! ## Architectural Principles
//!
//! - **Explicit stages:** Every iteration walks `Mutate → Run → Parse → Log → Persist`
//!   and the current `LoopStage` is observable from outside.
//! - **Keep going:** A model that fails, a backtest that fails and a memory store that is
//!   down all produce a recorded iteration, not an aborted run.
//! - **Dependency injection:** The model, the backtester and the memory store arrive as
//!   trait objects in a `TunerContext`.
//!
//! ## Public API
//!
//! - `SelfLoop` / `TunerContext`: The loop and what it is built from.
//! - `LearningLog` / `LearningLogRow`: The append-only CSV of iterations.
//! - `build_prompt` / `default_prompt`: Prompt construction from memory.
//! - `StagnationGuard` / `perturb`: The nudge applied when suggestions stop changing.
//! - `StrategyLab`: A whole new strategy from the model, optionally backtested.
//! - `run_battle` / `Leaderboard`: Several strategies backtested and ranked.
//! - `TunerError`: The specific error types that can be returned from this crate.

pub mod battle;
pub mod error;
pub mod heartbeat;
pub mod lab;
pub mod learning_log;
pub mod nudge;
pub mod prompt;
pub mod self_loop;

pub use battle::{BattleEntry, Leaderboard, run_battle};
pub use error::TunerError;
pub use heartbeat::{Progress, spawn_heartbeat};
pub use lab::{LabBacktest, LabResult, StrategyLab};
pub use learning_log::{HEADER as LEARNING_LOG_HEADER, LearningLog, LearningLogRow};
pub use nudge::{StagnationGuard, perturb};
pub use prompt::{STAGNATION_NOTE, build_prompt, default_prompt};
pub use self_loop::{SelfLoop, TunerContext, backtest_request_for, read_metrics};
