use core_types::{BacktestMetrics, Metric, parse_decimal};
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

/// One metric and the patterns that can recover it, most specific first.
struct MetricPatterns {
    name: &'static str,
    patterns: Vec<Regex>,
}

fn compile(name: &'static str, patterns: &[&str]) -> MetricPatterns {
    MetricPatterns {
        name,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).expect("metric pattern"))
            .collect(),
    }
}

// Separators cover both the ASCII table style and the box-drawing one.
static PROFIT: LazyLock<MetricPatterns> = LazyLock::new(|| {
    compile(
        "profit_percent",
        &[
            r"Total profit %\s*[|│┃]\s*(-?\d+(?:\.\d+)?)",
            r"Tot Profit %\s*[|│┃:]\s*(-?\d+(?:\.\d+)?)",
            r#"(?i)profit_total_pct["']?\s*[:=]\s*(-?\d+(?:\.\d+)?)"#,
        ],
    )
});

static TRADES: LazyLock<MetricPatterns> = LazyLock::new(|| {
    compile(
        "trades",
        &[
            r"Total/Daily Avg Trades\s*[|│┃]\s*(\d+)",
            r"(?i)Total trades\s*[|│┃:]\s*(\d+)",
            r#"(?i)\btotal_trades["']?\s*[:=]\s*(\d+)"#,
        ],
    )
});

static WIN_RATE: LazyLock<MetricPatterns> = LazyLock::new(|| {
    compile(
        "win_rate",
        &[
            r"Win%\s*[|│┃]\s*(\d+(?:\.\d+)?)",
            r"(?i)win\s*rate\s*[|│┃:=]\s*(\d+(?:\.\d+)?)",
        ],
    )
});

static DRAWDOWN: LazyLock<MetricPatterns> = LazyLock::new(|| {
    compile(
        "max_drawdown",
        &[
            r"Max % of account underwater\s*[|│┃]\s*(-?\d+(?:\.\d+)?)%",
            r"Absolute Drawdown \(Account\)\s*[|│┃]\s*(-?\d+(?:\.\d+)?)%",
            r"(?i)max\s*drawdown\s*%?\s*[|│┃:=]\s*(-?\d+(?:\.\d+)?)",
        ],
    )
});

impl MetricPatterns {
    fn first_match(&self, output: &str) -> Metric {
        for (index, pattern) in self.patterns.iter().enumerate() {
            if let Some(value) = pattern
                .captures(output)
                .and_then(|caps| parse_decimal(&caps[1]))
            {
                tracing::trace!(metric = self.name, pattern = index, %value, "Metric matched");
                return Metric::Parsed(value);
            }
        }
        Metric::Unparsed
    }
}

/// Recovers metrics from raw backtest output.
///
/// Each metric has an ordered list of patterns and the first match wins. What the
/// key/value patterns miss is then filled from the strategy summary table, if present.
pub fn parse_text_metrics(output: &str) -> BacktestMetrics {
    let mut metrics = BacktestMetrics {
        trades: TRADES.first_match(output),
        profit_percent: PROFIT.first_match(output),
        win_rate: WIN_RATE.first_match(output),
        max_drawdown: DRAWDOWN.first_match(output),
    };
    metrics.merge_missing(&parse_summary_table(output));
    metrics
}

/// Like [`parse_text_metrics`], but dumps the raw output to `debug_path` when the
/// profit could not be recovered, so the new report format can be inspected later.
pub fn parse_with_debug(output: &str, debug_path: &Path) -> BacktestMetrics {
    let metrics = parse_text_metrics(output);
    if !metrics.profit_percent.is_parsed() {
        tracing::warn!(path = %debug_path.display(), "Could not parse profit; saving raw output");
        if let Err(e) = append_debug(output, debug_path) {
            tracing::warn!(path = %debug_path.display(), error = %e, "Failed to write debug output");
        }
    }
    metrics
}

fn append_debug(output: &str, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "=== unparsed backtest output ===")?;
    file.write_all(output.as_bytes())?;
    writeln!(file)?;
    Ok(())
}

/// Reads the first data row of the `STRATEGY SUMMARY` table by column header.
pub fn parse_summary_table(output: &str) -> BacktestMetrics {
    let mut metrics = BacktestMetrics::default();
    let Some(start) = output.find("STRATEGY SUMMARY") else {
        return metrics;
    };

    let rows: Vec<Vec<String>> = output[start..]
        .lines()
        .skip(1)
        .map(split_row)
        .filter(|cells| cells.len() > 1)
        .collect();
    let Some(header) = rows.first() else {
        return metrics;
    };
    let Some(row) = rows.iter().skip(1).find(|r| r.len() == header.len()) else {
        return metrics;
    };

    for (title, cell) in header.iter().zip(row) {
        let title = title.as_str();
        if title == "Trades" {
            metrics.trades = parse_decimal(cell).into();
        } else if title.starts_with("Tot Profit %") || title == "Total Profit %" {
            metrics.profit_percent = parse_decimal(cell).into();
        } else if title.ends_with("Win%") {
            // "Win  Draw  Loss  Win%" → "20     0    22  47.6"
            metrics.win_rate = cell
                .split_whitespace()
                .last()
                .and_then(parse_decimal)
                .into();
        } else if title == "Drawdown" {
            // "5.123 USDT  0.51%" → the percentage
            metrics.max_drawdown = cell
                .split_whitespace()
                .find(|part| part.ends_with('%'))
                .and_then(parse_decimal)
                .into();
        }
    }
    metrics
}

fn split_row(line: &str) -> Vec<String> {
    line.split(['│', '┃', '|'])
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_the_plain_profit_line() {
        let metrics = parse_text_metrics("Total profit % | -3.45");
        assert_eq!(metrics.profit_percent, Metric::Parsed(dec!(-3.45)));
    }

    #[test]
    fn no_match_yields_sentinel_and_debug_file() {
        let dir = tempfile::tempdir().unwrap();
        let debug = dir.path().join("backtest_debug_output.txt");

        let metrics = parse_with_debug("Traceback: something exploded", &debug);
        assert_eq!(metrics.profit_percent, Metric::Unparsed);
        assert_eq!(metrics.profit_percent.to_string(), "unparsed");
        assert!(metrics.is_empty());

        let dumped = std::fs::read_to_string(&debug).unwrap();
        assert!(dumped.contains("something exploded"));
    }

    #[test]
    fn parsed_profit_writes_no_debug_file() {
        let dir = tempfile::tempdir().unwrap();
        let debug = dir.path().join("debug.txt");
        parse_with_debug("Total profit % | 1.00", &debug);
        assert!(!debug.exists());
    }

    #[test]
    fn box_drawing_metrics_table() {
        let output = "\
│ Total/Daily Avg Trades        │ 42 / 0.35          │
│ Total profit %                │ 12.5%              │
│ Max % of account underwater   │ 7.80%              │
";
        let metrics = parse_text_metrics(output);
        assert_eq!(metrics.trades, Metric::Parsed(dec!(42)));
        assert_eq!(metrics.profit_percent, Metric::Parsed(dec!(12.5)));
        assert_eq!(metrics.max_drawdown, Metric::Parsed(dec!(7.80)));
    }

    #[test]
    fn earlier_patterns_win() {
        let output = "Absolute Drawdown (Account) | 3.00%\nMax % of account underwater | 9.00%\n";
        assert_eq!(
            parse_text_metrics(output).max_drawdown,
            Metric::Parsed(dec!(9.00))
        );
    }

    #[test]
    fn summary_table_fills_the_gaps() {
        let output = "\
                                   STRATEGY SUMMARY
┏━━━━━━━━━━━━━━━━━━━━━┳━━━━━━━━┳━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━━━━━━━┓
┃ Strategy            ┃ Trades ┃ Avg Profit % ┃ Tot Profit USDT ┃ Tot Profit % ┃ Avg Duration ┃  Win  Draw  Loss  Win% ┃           Drawdown ┃
┡━━━━━━━━━━━━━━━━━━━━━╇━━━━━━━━╇━━━━━━━━━━━━━━╇━━━━━━━━━━━━━━━━━╇━━━━━━━━━━━━━━╇━━━━━━━━━━━━━━╇━━━━━━━━━━━━━━━━━━━━━━━━╇━━━━━━━━━━━━━━━━━━━━┩
│ SimpleAlwaysBuySell │     42 │         0.12 │          12.345 │         1.23 │      1:00:00 │   20     0    22  47.6 │ 5.123 USDT  0.51% │
└─────────────────────┴────────┴──────────────┴─────────────────┴──────────────┴──────────────┴────────────────────────┴────────────────────┘
";
        let metrics = parse_text_metrics(output);
        assert_eq!(metrics.trades, Metric::Parsed(dec!(42)));
        assert_eq!(metrics.profit_percent, Metric::Parsed(dec!(1.23)));
        assert_eq!(metrics.win_rate, Metric::Parsed(dec!(47.6)));
        assert_eq!(metrics.max_drawdown, Metric::Parsed(dec!(0.51)));
    }
}
