use core_types::{ParameterBounds, RoiTable, StrategyParameters};
use rand::Rng;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};

/// Tracks how long the effective parameters have stayed the same.
#[derive(Debug, Clone)]
pub struct StagnationGuard {
    after: Duration,
    last: Option<StrategyParameters>,
    unchanged_since: Instant,
}

impl StagnationGuard {
    pub fn new(after: Duration) -> Self {
        Self {
            after,
            last: None,
            unchanged_since: Instant::now(),
        }
    }

    /// Records `params` as proposed at `now` and reports whether they have been
    /// unchanged for longer than the threshold.
    pub fn is_stagnant(&mut self, params: &StrategyParameters, now: Instant) -> bool {
        if self.last.as_ref() != Some(params) {
            self.last = Some(params.clone());
            self.unchanged_since = now;
            return false;
        }
        now.duration_since(self.unchanged_since) >= self.after
    }

    /// Restarts the clock after a nudge.
    pub fn reset(&mut self, params: &StrategyParameters, now: Instant) {
        self.last = Some(params.clone());
        self.unchanged_since = now;
    }
}

/// Moves every ROI target by up to ±0.005 and the stoploss by up to ±0.02, then
/// clamps the result into `bounds`.
pub fn perturb<R: Rng>(
    params: &StrategyParameters,
    bounds: &ParameterBounds,
    rng: &mut R,
) -> StrategyParameters {
    let mut step = |max_steps: i64, scale: u32| {
        let mut steps = 0;
        while steps == 0 {
            steps = rng.gen_range(-max_steps..=max_steps);
        }
        Decimal::new(steps, scale)
    };

    let minimal_roi: RoiTable = params
        .minimal_roi
        .iter()
        .map(|(minutes, target)| (minutes, target + step(5, 3)))
        .collect();
    let nudged = StrategyParameters {
        minimal_roi,
        stoploss: params.stoploss + step(2, 2),
    };
    bounds.clamp(&nudged)
}
