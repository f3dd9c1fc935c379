use crate::params::StrategyParameters;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A metric scraped from backtest output.
///
/// The producing tool is not under our control, so every metric may be missing.
/// `Unparsed` is the sentinel for "no fallback pattern matched".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    Parsed(Decimal),
    #[default]
    Unparsed,
}

impl Metric {
    pub const SENTINEL: &'static str = "unparsed";

    pub fn value(&self) -> Option<Decimal> {
        match self {
            Metric::Parsed(v) => Some(*v),
            Metric::Unparsed => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Metric::Parsed(_))
    }

    /// Keeps `self` if parsed, otherwise takes `other`.
    pub fn or(self, other: Metric) -> Metric {
        match self {
            Metric::Parsed(_) => self,
            Metric::Unparsed => other,
        }
    }
}

impl From<Option<Decimal>> for Metric {
    fn from(value: Option<Decimal>) -> Self {
        value.map(Metric::Parsed).unwrap_or(Metric::Unparsed)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Parsed(v) => write!(f, "{}", v),
            Metric::Unparsed => f.write_str(Self::SENTINEL),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(Decimal::from_str(&n.to_string()).ok().into()),
            Repr::Text(s) if s == Self::SENTINEL => Ok(Metric::Unparsed),
            Repr::Text(s) => Decimal::from_str(s.trim())
                .map(Metric::Parsed)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// The handful of numbers the loop cares about from one backtest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub trades: Metric,
    pub profit_percent: Metric,
    pub win_rate: Metric,
    pub max_drawdown: Metric,
}

impl BacktestMetrics {
    /// Fills every unparsed metric of `self` from `other`.
    pub fn merge_missing(&mut self, other: &BacktestMetrics) {
        self.trades = self.trades.or(other.trades);
        self.profit_percent = self.profit_percent.or(other.profit_percent);
        self.win_rate = self.win_rate.or(other.win_rate);
        self.max_drawdown = self.max_drawdown.or(other.max_drawdown);
    }

    pub fn is_empty(&self) -> bool {
        !(self.trades.is_parsed()
            || self.profit_percent.is_parsed()
            || self.win_rate.is_parsed()
            || self.max_drawdown.is_parsed())
    }
}

/// One iteration of the tuning loop. Appended, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRecord {
    pub loop_index: u32,
    pub parameters: StrategyParameters,
    /// Whether the parameters came from the configured fallback instead of the model.
    #[serde(default)]
    pub used_fallback: bool,
    pub backtest_success: bool,
    pub metrics: BacktestMetrics,
    pub timestamp: DateTime<Utc>,
}

impl LoopRecord {
    /// A one-line, human-readable summary used as a memory entry and in prompts.
    pub fn summary(&self) -> String {
        format!(
            "Loop {}: minimal_roi_0={}, stoploss={}, success={}, trades={}, profit%={}, win_rate={}, max_drawdown={}",
            self.loop_index,
            self.parameters.minimal_roi_0(),
            self.parameters.stoploss,
            self.backtest_success,
            self.metrics.trades,
            self.metrics.profit_percent,
            self.metrics.win_rate,
            self.metrics.max_drawdown,
        )
    }
}
