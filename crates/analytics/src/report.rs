use crate::error::AnalyticsError;
use core_types::{BacktestMetrics, Metric, decimal_from_value};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// The headline numbers of a JSON backtest report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub strategy: Option<String>,
    pub trades: Metric,
    pub win_rate: Metric,
    pub profit_factor: Metric,
    pub profit_total_pct: Metric,
    pub profit_abs: Metric,
    pub avg_profit_pct: Metric,
    pub max_drawdown_abs: Metric,
    pub max_drawdown_pct: Metric,
}

impl ReportSummary {
    pub fn to_metrics(&self) -> BacktestMetrics {
        BacktestMetrics {
            trades: self.trades,
            profit_percent: self.profit_total_pct,
            win_rate: self.win_rate,
            max_drawdown: self.max_drawdown_pct,
        }
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Strategy: {} | Trades: {}",
            self.strategy.as_deref().unwrap_or("-"),
            self.trades
        )?;
        writeln!(f, "Win%: {}", self.win_rate)?;
        writeln!(f, "PF: {}", self.profit_factor)?;
        writeln!(f, "Total Profit %: {}", self.profit_total_pct)?;
        writeln!(f, "Absolute Profit: {}", self.profit_abs)?;
        writeln!(f, "Avg Profit %: {}", self.avg_profit_pct)?;
        write!(f, "DD Abs/%: {}/{}", self.max_drawdown_abs, self.max_drawdown_pct)
    }
}

/// First key of `keys` present in `object` with a numeric value.
fn number(object: &Map<String, Value>, keys: &[&str]) -> Metric {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find_map(decimal_from_value)
        .into()
}

/// A metrics object, descending into `{name: {...}}` maps and `[{...}]` lists.
fn metrics_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) if looks_like_metrics(map) => Some(map),
        Value::Object(map) => map.values().find_map(|v| match v {
            Value::Object(inner) if looks_like_metrics(inner) => Some(inner),
            _ => None,
        }),
        Value::Array(items) => items.first().and_then(metrics_object),
        _ => None,
    }
}

fn looks_like_metrics(map: &Map<String, Value>) -> bool {
    const KEYS: [&str; 6] = [
        "total_trades",
        "trades",
        "profit_total",
        "profit_total_pct",
        "profit_factor",
        "max_drawdown",
    ];
    KEYS.iter().any(|k| map.contains_key(*k))
}

/// Pulls the headline numbers out of a report using key-path fallbacks.
///
/// Sources are consulted in order and the first one that yields a value wins:
/// the first `strategy_comparison` row, then the `metrics`, `strategy_metrics`,
/// `results` and `strategy` sections (each possibly keyed by strategy name).
pub fn parse_json_report(data: &Value) -> ReportSummary {
    let mut summary = ReportSummary::default();

    if let Some(row) = data
        .get("strategy_comparison")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_object)
    {
        summary.strategy = row
            .get("Strategy")
            .or_else(|| row.get("strategy"))
            .or_else(|| row.get("key"))
            .and_then(Value::as_str)
            .map(str::to_string);
        summary.trades = number(row, &["Trades", "trades"]);
        summary.avg_profit_pct = number(row, &["Avg Profit %", "profit_mean_pct"]);
        summary.profit_abs = number(row, &["Tot Profit USDT", "Total Profit USDT", "profit_total_abs"]);
        summary.profit_total_pct = number(row, &["Tot Profit %", "Total Profit %", "profit_total_pct"]);
        summary.win_rate = number(row, &["Win%"]).or(ratio_as_pct(row, "winrate"));
        summary.max_drawdown_pct = ratio_as_pct(row, "max_drawdown_account");
    }

    if summary.strategy.is_none() {
        summary.strategy = match data.get("strategy") {
            Some(Value::String(name)) => Some(name.clone()),
            Some(Value::Object(map)) if map.len() == 1 && !looks_like_metrics(map) => {
                map.keys().next().cloned()
            }
            _ => None,
        };
    }

    for source in ["metrics", "strategy_metrics", "results", "strategy"] {
        let Some(m) = data.get(source).and_then(metrics_object) else {
            continue;
        };
        summary.profit_factor = summary.profit_factor.or(number(m, &["profit_factor", "pf"]));
        summary.win_rate = summary
            .win_rate
            .or(number(m, &["winrate_pct", "win_rate"]))
            .or(ratio_as_pct(m, "winrate"))
            .or(ratio_as_pct(m, "wins_ratio"));
        summary.profit_total_pct = summary
            .profit_total_pct
            .or(number(m, &["profit_total_pct", "total_profit_percent"]))
            .or(ratio_as_pct(m, "profit_total"));
        summary.profit_abs = summary
            .profit_abs
            .or(number(m, &["profit_total_abs", "profit_abs", "total_profit_abs"]));
        summary.max_drawdown_abs = summary
            .max_drawdown_abs
            .or(number(m, &["max_drawdown_abs", "max_drawdown_abs_usdt"]));
        summary.max_drawdown_pct = summary
            .max_drawdown_pct
            .or(number(m, &["max_drawdown_pct"]))
            .or(ratio_as_pct(m, "max_drawdown_account"))
            .or(ratio_as_pct(m, "max_drawdown"));
        summary.trades = summary.trades.or(number(m, &["total_trades", "trades"]));
        summary.avg_profit_pct = summary
            .avg_profit_pct
            .or(number(m, &["profit_mean_pct", "avg_profit", "Avg Profit %"]));
    }

    summary
}

/// Freqtrade stores ratios (0.0123); reports show percentages (1.23).
fn ratio_as_pct(object: &Map<String, Value>, key: &str) -> Metric {
    match number(object, &[key]) {
        Metric::Parsed(ratio) => Metric::Parsed(ratio * Decimal::ONE_HUNDRED),
        Metric::Unparsed => Metric::Unparsed,
    }
}

pub fn load_json_report(path: &Path) -> Result<ReportSummary, AnalyticsError> {
    let text = std::fs::read_to_string(path).map_err(|source| AnalyticsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let data: Value = serde_json::from_str(&text).map_err(|source| AnalyticsError::Json {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_json_report(&data))
}

/// Picks the report to read: an existing explicit path, else the newest `*.json` in
/// `reports_dir`, else `.last_result.json` in the working directory.
pub fn locate_report(explicit: Option<&Path>, reports_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| p.is_file()) {
        return Some(path.to_path_buf());
    }

    let newest = std::fs::read_dir(reports_dir).ok().and_then(|entries| {
        entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let modified = p.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, p))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, p)| p)
    });
    if newest.is_some() {
        return newest;
    }

    let last = PathBuf::from(".last_result.json");
    last.is_file().then_some(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn strategy_comparison_row_comes_first() {
        let data = json!({
            "strategy_comparison": [{
                "Strategy": "SimpleAlwaysBuySell",
                "Trades": 42,
                "Avg Profit %": 0.12,
                "Tot Profit USDT": 12.345,
                "Tot Profit %": 1.23
            }],
            "metrics": {"total_trades": 99, "profit_factor": 1.4, "max_drawdown_pct": 5.5}
        });
        let summary = parse_json_report(&data);
        assert_eq!(summary.strategy.as_deref(), Some("SimpleAlwaysBuySell"));
        assert_eq!(summary.trades, Metric::Parsed(dec!(42)));
        assert_eq!(summary.profit_total_pct, Metric::Parsed(dec!(1.23)));
        assert_eq!(summary.profit_factor, Metric::Parsed(dec!(1.4)));
        assert_eq!(summary.max_drawdown_pct, Metric::Parsed(dec!(5.5)));
    }

    #[test]
    fn freqtrade_export_keyed_by_strategy_name() {
        let data = json!({
            "strategy": {
                "SimpleAlwaysBuySell": {
                    "total_trades": 10,
                    "profit_total": 0.0345,
                    "profit_total_abs": 34.5,
                    "winrate": 0.6,
                    "max_drawdown_account": 0.021,
                    "profit_factor": 1.8
                }
            }
        });
        let summary = parse_json_report(&data);
        assert_eq!(summary.strategy.as_deref(), Some("SimpleAlwaysBuySell"));
        assert_eq!(summary.trades, Metric::Parsed(dec!(10)));
        assert_eq!(summary.profit_total_pct, Metric::Parsed(dec!(3.45)));
        assert_eq!(summary.win_rate, Metric::Parsed(dec!(60)));
        assert_eq!(summary.max_drawdown_pct, Metric::Parsed(dec!(2.1)));

        let metrics = summary.to_metrics();
        assert_eq!(metrics.profit_percent, Metric::Parsed(dec!(3.45)));
    }

    #[test]
    fn missing_everything_stays_unparsed() {
        let summary = parse_json_report(&json!({"unrelated": true}));
        assert_eq!(summary, ReportSummary::default());
        assert!(summary.to_string().contains("Strategy: - | Trades: unparsed"));
    }

    #[test]
    fn locate_prefers_explicit_then_newest() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        std::fs::create_dir_all(&reports).unwrap();
        let old = reports.join("old.json");
        std::fs::write(&old, "{}").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let new = reports.join("new.json");
        std::fs::write(&new, "{}").unwrap();
        std::fs::write(reports.join("notes.txt"), "x").unwrap();

        assert_eq!(locate_report(Some(&old), &reports), Some(old.clone()));
        assert_eq!(locate_report(None, &reports), Some(new.clone()));
        assert_eq!(
            locate_report(Some(&dir.path().join("missing.json")), &reports),
            Some(new)
        );
    }

    #[test]
    fn load_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_json_report(&path), Err(AnalyticsError::Json { .. })));
    }
}
