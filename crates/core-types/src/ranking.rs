use crate::structs::{BacktestMetrics, LoopRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A backtest result that competes on profit.
pub trait Ranked {
    fn succeeded(&self) -> bool;
    fn metrics(&self) -> BacktestMetrics;

    /// Parsed profit of a successful backtest. Failed or unparsed results do not rank.
    fn ranking_profit(&self) -> Option<Decimal> {
        if self.succeeded() {
            self.metrics().profit_percent.value()
        } else {
            None
        }
    }

    /// Whether `self` should replace `current` as the best so far. Equal profit keeps
    /// `current`, so the earlier result wins ties.
    fn beats(&self, current: Option<&Self>) -> bool {
        match (self.ranking_profit(), current.and_then(Ranked::ranking_profit)) {
            (Some(profit), Some(best)) => profit > best,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl Ranked for LoopRecord {
    fn succeeded(&self) -> bool {
        self.backtest_success
    }

    fn metrics(&self) -> BacktestMetrics {
        self.metrics
    }
}

/// The highest-profit item, or `None` when nothing ranks.
pub fn best_of<'a, T: Ranked + 'a>(items: impl IntoIterator<Item = &'a T>) -> Option<&'a T> {
    items
        .into_iter()
        .fold(None, |best, item| if item.beats(best) { Some(item) } else { best })
}

/// Hard filters applied before ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankFilters {
    /// Results with fewer parsed trades are dropped. Unparsed trades count as zero.
    pub min_trades: Decimal,
    /// Results whose parsed drawdown exceeds this are dropped. Unparsed drawdown passes.
    pub max_drawdown_pct: Option<Decimal>,
}

impl RankFilters {
    pub fn admits(&self, metrics: &BacktestMetrics) -> bool {
        if metrics.trades.value().unwrap_or(Decimal::ZERO) < self.min_trades {
            return false;
        }
        match (self.max_drawdown_pct, metrics.max_drawdown.value()) {
            (Some(limit), Some(drawdown)) => drawdown.abs() <= limit,
            _ => true,
        }
    }
}

/// Items that rank and pass `filters`, best profit first. Equal profits keep input order.
pub fn rank<'a, T: Ranked + 'a>(
    items: impl IntoIterator<Item = &'a T>,
    filters: &RankFilters,
) -> Vec<&'a T> {
    let mut ranked: Vec<(Decimal, &T)> = items
        .into_iter()
        .filter(|item| filters.admits(&item.metrics()))
        .filter_map(|item| item.ranking_profit().map(|profit| (profit, item)))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metric, StrategyParameters};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn record(loop_index: u32, success: bool, profit: Option<Decimal>) -> LoopRecord {
        LoopRecord {
            loop_index,
            parameters: StrategyParameters::new(dec!(0.02), dec!(-0.10)),
            used_fallback: false,
            backtest_success: success,
            metrics: BacktestMetrics {
                profit_percent: profit.into(),
                ..BacktestMetrics::default()
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn failures_and_unparsed_profit_never_win() {
        let failed = record(1, false, Some(dec!(50)));
        let unparsed = record(2, true, None);
        let modest = record(3, true, Some(dec!(-1)));
        assert!(!failed.beats(None));
        assert!(!unparsed.beats(None));
        assert!(modest.beats(Some(&failed)));
        assert!(modest.beats(Some(&unparsed)));
    }

    #[test]
    fn ties_keep_the_earlier_record() {
        let records = vec![
            record(1, true, Some(dec!(2.5))),
            record(2, true, Some(dec!(4))),
            record(3, true, Some(dec!(4))),
            record(4, false, None),
        ];
        assert_eq!(best_of(&records).unwrap().loop_index, 2);
        assert!(best_of(&records[3..]).is_none());

        let order: Vec<u32> = rank(&records, &RankFilters::default())
            .iter()
            .map(|r| r.loop_index)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn filters_check_trades_and_drawdown() {
        let filters = RankFilters {
            min_trades: dec!(5),
            max_drawdown_pct: Some(dec!(20)),
        };
        let mut metrics = BacktestMetrics {
            trades: Metric::Parsed(dec!(5)),
            ..BacktestMetrics::default()
        };
        assert!(filters.admits(&metrics));
        metrics.max_drawdown = Metric::Parsed(dec!(-25));
        assert!(!filters.admits(&metrics));
        metrics.max_drawdown = Metric::Unparsed;
        metrics.trades = Metric::Unparsed;
        assert!(!filters.admits(&metrics));
    }
}
