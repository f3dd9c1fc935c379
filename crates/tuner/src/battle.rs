use crate::error::TunerError;
use crate::self_loop::{backtest_request_for, read_metrics};
use backtester::BacktestRunner;
use chrono::{DateTime, Utc};
use configuration::AppConfig;
use core_types::{BacktestMetrics, RankFilters, Ranked, rank};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One strategy's showing in a battle.
#[derive(Debug, Clone, Serialize)]
pub struct BattleEntry {
    pub strategy: String,
    pub success: bool,
    pub elapsed_secs: f64,
    pub metrics: BacktestMetrics,
}

impl Ranked for BattleEntry {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn metrics(&self) -> BacktestMetrics {
        self.metrics
    }
}

/// What `leaderboard.json` holds.
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub generated_at: DateTime<Utc>,
    pub filters: RankFilters,
    /// Best profit first. Only entries that rank and pass the filters.
    pub ranked: Vec<BattleEntry>,
    /// Everything else, in the order it ran.
    pub unranked: Vec<BattleEntry>,
}

impl Leaderboard {
    pub fn new(entries: Vec<BattleEntry>, filters: RankFilters, generated_at: DateTime<Utc>) -> Self {
        let best = rank(&entries, &filters);
        let ranked = best.iter().map(|entry| (*entry).clone()).collect();
        let unranked = entries
            .iter()
            .filter(|entry| !best.iter().any(|kept| std::ptr::eq(*kept, *entry)))
            .cloned()
            .collect();
        Self {
            generated_at,
            filters,
            ranked,
            unranked,
        }
    }

    pub fn winner(&self) -> Option<&BattleEntry> {
        self.ranked.first()
    }
}

/// Backtests each of `strategies` in turn under `config` and writes the ranking to
/// `<runs_dir>/battle-<timestamp>/leaderboard.json`.
///
/// A strategy whose backtest fails is still listed, unranked. Only a runner that
/// cannot run at all or an unwritable leaderboard stops the battle.
pub async fn run_battle(
    config: &AppConfig,
    runner: &dyn BacktestRunner,
    strategies: &[String],
    filters: RankFilters,
) -> Result<(PathBuf, Leaderboard), TunerError> {
    let started = Utc::now();
    let root = config
        .paths
        .runs_dir
        .join(format!("battle-{}", started.format("%Y%m%d-%H%M%S")));

    let mut entries = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let export = root.join(format!("trades_{}.json", strategy));
        let request = backtest_request_for(config, strategy, export);
        tracing::info!(%strategy, "Battle backtest");
        let outcome = runner.run(&request).await?;
        let metrics = read_metrics(&outcome, &request, &config.paths.debug_output);
        entries.push(BattleEntry {
            strategy: strategy.clone(),
            success: outcome.success,
            elapsed_secs: outcome.duration.as_secs_f64(),
            metrics,
        });
    }

    let leaderboard = Leaderboard::new(entries, filters, started);
    let path = write_leaderboard(&root, &leaderboard)?;
    match leaderboard.winner() {
        Some(winner) => tracing::info!(strategy = %winner.strategy, path = %path.display(), "Battle complete"),
        None => tracing::warn!(path = %path.display(), "Battle complete; no strategy ranked"),
    }
    Ok((path, leaderboard))
}

fn write_leaderboard(root: &Path, leaderboard: &Leaderboard) -> Result<PathBuf, TunerError> {
    let io = |path: &Path, source: std::io::Error| TunerError::Io {
        path: path.display().to_string(),
        source,
    };
    std::fs::create_dir_all(root).map_err(|e| io(root, e))?;
    let path = root.join("leaderboard.json");
    let json = serde_json::to_string_pretty(leaderboard)
        .map_err(|e| io(&path, std::io::Error::other(e)))?;
    std::fs::write(&path, json).map_err(|e| io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Metric;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn entry(strategy: &str, success: bool, profit: Option<Decimal>, trades: Decimal) -> BattleEntry {
        BattleEntry {
            strategy: strategy.to_string(),
            success,
            elapsed_secs: 1.5,
            metrics: BacktestMetrics {
                profit_percent: profit.into(),
                trades: Metric::Parsed(trades),
                ..BacktestMetrics::default()
            },
        }
    }

    #[test]
    fn leaderboard_splits_ranked_from_the_rest() {
        let entries = vec![
            entry("Broken", false, None, dec!(0)),
            entry("Modest", true, Some(dec!(1.5)), dec!(40)),
            entry("Thin", true, Some(dec!(9)), dec!(2)),
            entry("Strong", true, Some(dec!(4)), dec!(25)),
        ];
        let filters = RankFilters {
            min_trades: dec!(10),
            max_drawdown_pct: None,
        };

        let board = Leaderboard::new(entries, filters, Utc::now());

        let ranked: Vec<&str> = board.ranked.iter().map(|e| e.strategy.as_str()).collect();
        assert_eq!(ranked, vec!["Strong", "Modest"]);
        let unranked: Vec<&str> = board.unranked.iter().map(|e| e.strategy.as_str()).collect();
        assert_eq!(unranked, vec!["Broken", "Thin"]);
        assert_eq!(board.winner().unwrap().strategy, "Strong");
    }

    #[test]
    fn leaderboard_json_keeps_metric_sentinels() {
        let board = Leaderboard::new(
            vec![entry("Broken", false, None, dec!(0))],
            RankFilters::default(),
            Utc::now(),
        );
        let value = serde_json::to_value(&board).unwrap();
        assert_eq!(value["ranked"].as_array().unwrap().len(), 0);
        assert_eq!(value["unranked"][0]["metrics"]["profit_percent"], "unparsed");
        assert_eq!(value["unranked"][0]["elapsed_secs"], 1.5);
    }
}
