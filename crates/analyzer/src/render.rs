use crate::summary::LogStats;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use tuner::LearningLogRow;

/// Renders rows in the order given as a terminal table.
pub fn render_summary_table(rows: &[&LearningLogRow]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Loop", "ROI[0]", "Stoploss", "Fallback", "Success", "Trades", "Profit %", "Win %",
            "Drawdown", "Timestamp",
        ]);

    for row in rows {
        table.add_row(vec![
            row.loop_index.to_string(),
            row.minimal_roi_0.to_string(),
            row.stoploss.to_string(),
            yes_no(row.used_fallback).to_string(),
            yes_no(row.backtest_success).to_string(),
            row.trades.to_string(),
            row.profit_percent.to_string(),
            row.win_rate.to_string(),
            row.max_drawdown.to_string(),
            row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_stats(stats: &LogStats) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    let optional = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    table.add_row(vec!["Iterations".to_string(), stats.total.to_string()]);
    table.add_row(vec!["Successful backtests".to_string(), stats.successes.to_string()]);
    table.add_row(vec!["Fallback parameters".to_string(), stats.fallbacks.to_string()]);
    table.add_row(vec![
        "Fallback rate %".to_string(),
        optional(stats.fallback_rate.map(|r| r.to_string())),
    ]);
    table.add_row(vec!["With profit figure".to_string(), stats.with_profit.to_string()]);
    table.add_row(vec![
        "Average profit %".to_string(),
        optional(stats.avg_profit_percent.map(|p| p.to_string())),
    ]);
    table.add_row(vec![
        "Best loop".to_string(),
        optional(stats.best_loop.map(|l| l.to_string())),
    ]);
    table.to_string()
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
