use core_types::{RankFilters, best_of};
use rust_decimal::Decimal;
use tuner::LearningLogRow;

/// The last `n` rows, newest first.
pub fn summarize(rows: &[LearningLogRow], n: usize) -> Vec<&LearningLogRow> {
    rows.iter().rev().take(n).collect()
}

/// The successful row with the highest parsed profit. Ties go to the earlier row.
pub fn best_record(rows: &[LearningLogRow]) -> Option<&LearningLogRow> {
    best_of(rows)
}

/// Successful rows with a parsed profit that pass `filters`, best profit first.
pub fn rank<'a>(rows: &'a [LearningLogRow], filters: &RankFilters) -> Vec<&'a LearningLogRow> {
    core_types::rank(rows, filters)
}

/// Rows to display: the newest `n`, or with `filters` the best `n` that pass them.
pub fn select<'a>(
    rows: &'a [LearningLogRow],
    n: usize,
    filters: Option<&RankFilters>,
) -> Vec<&'a LearningLogRow> {
    match filters {
        Some(filters) => rank(rows, filters).into_iter().take(n).collect(),
        None => summarize(rows, n),
    }
}

/// Counts over a whole log.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogStats {
    pub total: usize,
    pub successes: usize,
    pub fallbacks: usize,
    /// Share of iterations that used the fallback pair, in percent.
    pub fallback_rate: Option<Decimal>,
    /// Rows with a parsed profit figure.
    pub with_profit: usize,
    pub avg_profit_percent: Option<Decimal>,
    pub best_loop: Option<u32>,
}

pub fn stats(rows: &[LearningLogRow]) -> LogStats {
    let profits: Vec<Decimal> = rows
        .iter()
        .filter(|row| row.backtest_success)
        .filter_map(|row| row.profit_percent.value())
        .collect();
    let avg_profit_percent = (!profits.is_empty()).then(|| {
        (profits.iter().copied().sum::<Decimal>() / Decimal::from(profits.len())).round_dp(4)
    });

    let fallbacks = rows.iter().filter(|row| row.used_fallback).count();
    let fallback_rate = (!rows.is_empty()).then(|| {
        (Decimal::from(fallbacks) * Decimal::ONE_HUNDRED / Decimal::from(rows.len())).round_dp(2)
    });

    LogStats {
        total: rows.len(),
        successes: rows.iter().filter(|row| row.backtest_success).count(),
        fallbacks,
        fallback_rate,
        with_profit: profits.len(),
        avg_profit_percent,
        best_loop: best_record(rows).map(|row| row.loop_index),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use core_types::Metric;
    use rust_decimal::Decimal;
    use tuner::LearningLogRow;

    pub fn row(loop_index: u32, success: bool, profit: Option<Decimal>, trades: Option<Decimal>) -> LearningLogRow {
        LearningLogRow {
            loop_index,
            minimal_roi_0: Decimal::new(20, 3),
            stoploss: Decimal::new(-10, 2),
            minimal_roi: "{\"0\": 0.020}".to_string(),
            used_fallback: !success,
            backtest_success: success,
            trades: trades.into(),
            profit_percent: profit.into(),
            win_rate: Metric::Unparsed,
            max_drawdown: Metric::Unparsed,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, loop_index, 0).unwrap(),
        }
    }
}
