use crate::error::CoreError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A minimal-ROI table: elapsed minutes since entry → minimum return fraction.
///
/// Keys are held as integers so the table always renders in chronological order.
/// On the wire (JSON, strategy source) the keys are strings, e.g. `{"0": 0.015}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoiTable(BTreeMap<u32, Decimal>);

impl RoiTable {
    /// A table with a single immediate target at minute 0.
    pub fn single(target: Decimal) -> Self {
        let mut table = BTreeMap::new();
        table.insert(0, target);
        Self(table)
    }

    pub fn insert(&mut self, minutes: u32, target: Decimal) {
        self.0.insert(minutes, target);
    }

    pub fn get(&self, minutes: u32) -> Option<Decimal> {
        self.0.get(&minutes).copied()
    }

    /// The target of the earliest step. This is what the loop reports as `minimal_roi_0`.
    pub fn first(&self) -> Option<Decimal> {
        self.0.values().next().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Decimal)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the table as a Python dict literal with three decimals per target.
    pub fn to_source_literal(&self) -> String {
        let entries: Vec<String> = self
            .0
            .iter()
            .map(|(minutes, target)| format!("\"{}\": {:.3}", minutes, target.round_dp(3)))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

impl FromIterator<(u32, Decimal)> for RoiTable {
    fn from_iter<I: IntoIterator<Item = (u32, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The two tunable knobs of a strategy file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParameters {
    pub minimal_roi: RoiTable,
    pub stoploss: Decimal,
}

impl StrategyParameters {
    /// Builds the common single-step form `{"0": roi}` plus a stoploss.
    pub fn new(minimal_roi_0: Decimal, stoploss: Decimal) -> Self {
        Self {
            minimal_roi: RoiTable::single(minimal_roi_0),
            stoploss,
        }
    }

    pub fn minimal_roi_0(&self) -> Decimal {
        self.minimal_roi.first().unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for StrategyParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "minimal_roi={} stoploss={}",
            self.minimal_roi.to_source_literal(),
            self.stoploss
        )
    }
}

/// An inclusive `[min, max]` range for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl ValueRange {
    pub fn new(min: Decimal, max: Decimal) -> Result<Self, CoreError> {
        if min > max {
            return Err(CoreError::InvalidRange {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(Self { min, max })
    }

    pub fn clamp(&self, value: Decimal) -> Decimal {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The safe ranges every parameter is clamped to before it reaches a strategy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub roi: ValueRange,
    pub stoploss: ValueRange,
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            roi: ValueRange {
                min: dec!(0.001),
                max: dec!(0.10),
            },
            stoploss: ValueRange {
                min: dec!(-0.30),
                max: dec!(-0.01),
            },
        }
    }
}

impl ParameterBounds {
    /// Clamps every ROI target and the stoploss into range.
    ///
    /// An empty ROI table is replaced by a single step at the lower ROI bound so the
    /// result is always writable.
    pub fn clamp(&self, params: &StrategyParameters) -> StrategyParameters {
        let minimal_roi = if params.minimal_roi.is_empty() {
            RoiTable::single(self.roi.min)
        } else {
            params
                .minimal_roi
                .iter()
                .map(|(minutes, target)| (minutes, self.roi.clamp(target)))
                .collect()
        };
        StrategyParameters {
            minimal_roi,
            stoploss: self.stoploss.clamp(params.stoploss),
        }
    }

    pub fn contains(&self, params: &StrategyParameters) -> bool {
        !params.minimal_roi.is_empty()
            && params.minimal_roi.iter().all(|(_, v)| self.roi.contains(v))
            && self.stoploss.contains(params.stoploss)
    }
}

/// Where the parameters of an iteration came from.
///
/// Free text from a model is never used directly: it either passes the parse and
/// validate boundary and becomes `Suggested`, or the configured fallback is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterProposal {
    Suggested { params: StrategyParameters },
    Fallback {
        params: StrategyParameters,
        reason: String,
    },
}

impl ParameterProposal {
    pub fn params(&self) -> &StrategyParameters {
        match self {
            ParameterProposal::Suggested { params } => params,
            ParameterProposal::Fallback { params, .. } => params,
        }
    }

    pub fn into_params(self) -> StrategyParameters {
        match self {
            ParameterProposal::Suggested { params } => params,
            ParameterProposal::Fallback { params, .. } => params,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParameterProposal::Fallback { .. })
    }
}

/// Reads a finite decimal out of a loosely-typed JSON value.
///
/// Accepts JSON numbers and numeric strings (plain or scientific notation).
/// Returns `None` for anything else, including `"NaN"` and `"inf"`.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Parses a decimal from text, tolerating surrounding whitespace, a trailing `%`
/// and scientific notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamp_pulls_values_into_default_bounds() {
        let bounds = ParameterBounds::default();
        let wild = StrategyParameters::new(dec!(5.0), dec!(-0.9));
        let clamped = bounds.clamp(&wild);
        assert_eq!(clamped.minimal_roi_0(), dec!(0.10));
        assert_eq!(clamped.stoploss, dec!(-0.30));

        let positive_stop = StrategyParameters::new(dec!(0.0), dec!(0.2));
        let clamped = bounds.clamp(&positive_stop);
        assert_eq!(clamped.minimal_roi_0(), dec!(0.001));
        assert_eq!(clamped.stoploss, dec!(-0.01));
        assert!(bounds.contains(&clamped));
    }

    #[test]
    fn clamp_fills_empty_roi_table() {
        let bounds = ParameterBounds::default();
        let params = StrategyParameters {
            minimal_roi: RoiTable::default(),
            stoploss: dec!(-0.05),
        };
        let clamped = bounds.clamp(&params);
        assert_eq!(clamped.minimal_roi.len(), 1);
        assert_eq!(clamped.minimal_roi_0(), dec!(0.001));
    }

    #[test]
    fn invalid_range_is_rejected() {
        assert!(ValueRange::new(dec!(0.2), dec!(0.1)).is_err());
        assert!(ValueRange::new(dec!(0.1), dec!(0.1)).is_ok());
    }

    #[test]
    fn roi_literal_is_chronological_with_three_decimals() {
        let mut table = RoiTable::single(dec!(0.02));
        table.insert(120, dec!(0.005));
        table.insert(30, dec!(0.01));
        assert_eq!(
            table.to_source_literal(),
            r#"{"0": 0.020, "30": 0.010, "120": 0.005}"#
        );
    }

    #[test]
    fn decimal_from_value_rejects_non_finite_text() {
        assert_eq!(decimal_from_value(&json!(0.015)), Some(dec!(0.015)));
        assert_eq!(decimal_from_value(&json!("-0.08")), Some(dec!(-0.08)));
        assert_eq!(decimal_from_value(&json!("1e-2")), Some(dec!(0.01)));
        assert_eq!(decimal_from_value(&json!("NaN")), None);
        assert_eq!(decimal_from_value(&json!("inf")), None);
        assert_eq!(decimal_from_value(&json!(null)), None);
        assert_eq!(decimal_from_value(&json!([1])), None);
    }

    #[test]
    fn proposal_serialises_with_kind_tag() {
        let proposal = ParameterProposal::Fallback {
            params: StrategyParameters::new(dec!(0.012), dec!(-0.11)),
            reason: "no json".to_string(),
        };
        let value = serde_json::to_value(&proposal).unwrap();
        assert_eq!(value["kind"], "fallback");
        assert!(proposal.is_fallback());
        assert_eq!(proposal.params().stoploss, dec!(-0.11));
    }
}
