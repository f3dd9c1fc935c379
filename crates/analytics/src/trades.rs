use crate::error::AnalyticsError;
use core_types::{BacktestMetrics, Metric, decimal_from_value, parse_decimal};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Totals over an exported trade list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TradeSummary {
    pub trades: u64,
    pub wins: u64,
    pub profit_abs_sum: Decimal,
    pub profit_ratio_sum: Decimal,
}

impl TradeSummary {
    fn add(&mut self, profit_ratio: Decimal, profit_abs: Decimal) {
        self.trades += 1;
        self.profit_ratio_sum += profit_ratio;
        self.profit_abs_sum += profit_abs;
        if profit_ratio > Decimal::ZERO {
            self.wins += 1;
        }
    }

    /// Winning trades as a percentage; zero when there were no trades.
    pub fn win_rate(&self) -> Decimal {
        if self.trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) * Decimal::ONE_HUNDRED / Decimal::from(self.trades)
    }

    /// Trade count, summed profit ratio as a percentage, and win rate. A trade list
    /// carries no drawdown.
    pub fn to_metrics(&self) -> BacktestMetrics {
        BacktestMetrics {
            trades: Metric::Parsed(Decimal::from(self.trades)),
            profit_percent: Metric::Parsed(self.profit_ratio_sum * Decimal::ONE_HUNDRED),
            win_rate: Metric::Parsed(self.win_rate().round_dp(4)),
            max_drawdown: Metric::Unparsed,
        }
    }
}

/// Sums a trades CSV with `profit_ratio` and `profit_abs` columns.
///
/// A missing file summarises to zero trades. Cells that do not parse count as zero.
pub fn summarize_trades_csv(path: &Path) -> Result<TradeSummary, AnalyticsError> {
    let mut summary = TradeSummary::default();
    if !path.exists() {
        return Ok(summary);
    }
    let csv_err = |source| AnalyticsError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let ratio_col = column("profit_ratio");
    let abs_col = column("profit_abs");

    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let cell = |col: Option<usize>| {
            col.and_then(|i| record.get(i))
                .and_then(parse_decimal)
                .unwrap_or_default()
        };
        summary.add(cell(ratio_col), cell(abs_col));
    }
    tracing::debug!(path = %path.display(), trades = summary.trades, "Summarised trades CSV");
    Ok(summary)
}

/// Sums a freqtrade JSON trade export: either a bare list of trades, a
/// `{"trades": [...]}` object, or `{"strategy": {name: {"trades": [...]}}}`.
pub fn summarize_trades_json(data: &Value) -> TradeSummary {
    let mut summary = TradeSummary::default();
    for trade in trade_list(data).into_iter().flatten() {
        let field = |key: &str| trade.get(key).and_then(decimal_from_value).unwrap_or_default();
        summary.add(field("profit_ratio"), field("profit_abs"));
    }
    summary
}

fn trade_list(data: &Value) -> Option<&Vec<Value>> {
    match data {
        Value::Array(trades) => Some(trades),
        Value::Object(map) => map
            .get("trades")
            .and_then(Value::as_array)
            .or_else(|| {
                map.get("strategy")
                    .and_then(Value::as_object)
                    .and_then(|strategies| strategies.values().find_map(trade_list))
            }),
        _ => None,
    }
}

/// Summarises an export by extension: `.json` as a JSON export, anything else as CSV.
pub fn summarize_trades_file(path: &Path) -> Result<TradeSummary, AnalyticsError> {
    if path.extension().is_none_or(|ext| ext != "json") {
        return summarize_trades_csv(path);
    }
    if !path.exists() {
        return Ok(TradeSummary::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| AnalyticsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let data: Value = serde_json::from_str(&text).map_err(|source| AnalyticsError::Json {
        path: path.display().to_string(),
        source,
    })?;
    Ok(summarize_trades_json(&data))
}
