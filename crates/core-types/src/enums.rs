use serde::{Deserialize, Serialize};
use std::fmt;

/// The stages of one tuning run.
///
/// A run starts in `Init`, cycles through `Mutate → Run → Parse → Log → Persist`
/// once per iteration and ends in `Done` after the configured number of iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopStage {
    Init,
    Mutate,
    Run,
    Parse,
    Log,
    Persist,
    Done,
}

impl LoopStage {
    /// Returns the stage that follows `self` within an iteration.
    ///
    /// `Persist` wraps around to `Mutate`; deciding whether the run is finished
    /// is the driver's job, not the stage's.
    pub fn next(&self) -> Self {
        match self {
            LoopStage::Init => LoopStage::Mutate,
            LoopStage::Mutate => LoopStage::Run,
            LoopStage::Run => LoopStage::Parse,
            LoopStage::Parse => LoopStage::Log,
            LoopStage::Log => LoopStage::Persist,
            LoopStage::Persist => LoopStage::Mutate,
            LoopStage::Done => LoopStage::Done,
        }
    }
}

impl fmt::Display for LoopStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopStage::Init => "INIT",
            LoopStage::Mutate => "MUTATE",
            LoopStage::Run => "RUN",
            LoopStage::Parse => "PARSE",
            LoopStage::Log => "LOG",
            LoopStage::Persist => "PERSIST",
            LoopStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// The keys under which the tuning loop keeps its memory in a `MemoryStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryTier {
    /// Bounded window of recent iteration summaries.
    ShortTerm,
    /// Unbounded list of summaries from successful backtests.
    LongTerm,
    /// One structured entry per iteration.
    History,
    /// The best parameters seen so far.
    Best,
}

impl MemoryTier {
    pub fn key(&self) -> &'static str {
        match self {
            MemoryTier::ShortTerm => "short_term_memory",
            MemoryTier::LongTerm => "long_term_memory",
            MemoryTier::History => "backtest_history",
            MemoryTier::Best => "best_parameters",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_wraps_to_mutate() {
        let mut stage = LoopStage::Init;
        let mut seen = Vec::new();
        for _ in 0..7 {
            stage = stage.next();
            seen.push(stage.to_string());
        }
        assert_eq!(
            seen,
            vec!["MUTATE", "RUN", "PARSE", "LOG", "PERSIST", "MUTATE", "RUN"]
        );
        assert_eq!(LoopStage::Done.next(), LoopStage::Done);
    }
}
