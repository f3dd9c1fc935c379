use crate::error::WfoError;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::fmt::Write as _;

/// Dates in timeranges and period listings are compact `YYYYMMDD`.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// A "month" is 30 days throughout walk-forward generation.
const DAYS_PER_MONTH: u64 = 30;

/// One train/test split. The test window starts where the training window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkPeriod {
    /// 1-based position in the generated sequence.
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

impl WalkPeriod {
    /// The training window as a backtester timerange, e.g. `20220101-20220401`.
    pub fn train_range(&self) -> String {
        timerange(self.train_start, self.train_end)
    }

    pub fn test_range(&self) -> String {
        timerange(self.test_start, self.test_end)
    }

    fn row(&self) -> PeriodRow {
        PeriodRow {
            period: self.index,
            train_start: self.train_start.format(DATE_FORMAT).to_string(),
            train_end: self.train_end.format(DATE_FORMAT).to_string(),
            test_start: self.test_start.format(DATE_FORMAT).to_string(),
            test_end: self.test_end.format(DATE_FORMAT).to_string(),
        }
    }
}

fn timerange(start: NaiveDate, end: NaiveDate) -> String {
    format!("{}-{}", start.format(DATE_FORMAT), end.format(DATE_FORMAT))
}

/// The serialized shape of a period in the JSON and CSV listings.
#[derive(Debug, Serialize)]
struct PeriodRow {
    period: usize,
    train_start: String,
    train_end: String,
    test_start: String,
    test_end: String,
}

pub fn parse_date(text: &str) -> Result<NaiveDate, WfoError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|e| WfoError::DateError(format!("invalid date {:?} (expected YYYYMMDD): {}", text, e)))
}

/// Slides a `train_months + test_months` window from `start` in steps of `step_months`.
///
/// A period is kept only if its test window ends on or before `end`. Generation stops
/// at the first period that would overrun.
pub fn generate_periods(
    start: NaiveDate,
    end: NaiveDate,
    train_months: u32,
    test_months: u32,
    step_months: u32,
) -> Result<Vec<WalkPeriod>, WfoError> {
    if train_months == 0 || test_months == 0 || step_months == 0 {
        return Err(WfoError::DateError(
            "train, test and step lengths must all be at least one month".to_string(),
        ));
    }
    if start >= end {
        return Err(WfoError::DateError(format!(
            "start {} is not before end {}",
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT)
        )));
    }

    let mut periods = Vec::new();
    let mut current = start;

    while current < end {
        let train_end = add_months(current, train_months)?;
        let test_end = add_months(train_end, test_months)?;
        if test_end > end {
            break;
        }
        periods.push(WalkPeriod {
            index: periods.len() + 1,
            train_start: current,
            train_end,
            test_start: train_end,
            test_end,
        });
        current = add_months(current, step_months)?;
    }

    tracing::debug!(count = periods.len(), "Generated walk-forward periods");
    Ok(periods)
}

/// `date` moved forward by `months` 30-day months.
fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, WfoError> {
    date.checked_add_days(Days::new(u64::from(months) * DAYS_PER_MONTH))
        .ok_or_else(|| {
            WfoError::DateError(format!(
                "{} plus {} months is out of the supported date range",
                date.format(DATE_FORMAT),
                months
            ))
        })
}

/// Output formats of [`render_periods`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodFormat {
    /// `TRAIN_RANGE_n` / `TEST_RANGE_n` shell assignments.
    #[default]
    Bash,
    Json,
    Csv,
}

pub fn render_periods(periods: &[WalkPeriod], format: PeriodFormat) -> Result<String, WfoError> {
    match format {
        PeriodFormat::Bash => {
            let mut out = format!("# Generated {} walk-forward validation periods\n\n", periods.len());
            for period in periods {
                // Writing into a String cannot fail.
                let _ = writeln!(
                    out,
                    "# Period {i}\nTRAIN_RANGE_{i}=\"{}\"\nTEST_RANGE_{i}=\"{}\"\n",
                    period.train_range(),
                    period.test_range(),
                    i = period.index
                );
            }
            Ok(out)
        }
        PeriodFormat::Json => {
            let rows: Vec<PeriodRow> = periods.iter().map(WalkPeriod::row).collect();
            Ok(serde_json::to_string_pretty(&rows)?)
        }
        PeriodFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            if periods.is_empty() {
                writer.write_record(["period", "train_start", "train_end", "test_start", "test_end"])?;
            }
            for period in periods {
                writer.serialize(period.row())?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| WfoError::Render(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| WfoError::Render(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        parse_date(text).unwrap()
    }

    #[test]
    fn periods_slide_by_the_step_and_stop_before_the_end() {
        let periods = generate_periods(date("20220101"), date("20230101"), 3, 1, 1).unwrap();

        // 365 days hold start offsets 0, 30, ..., 240 for a 120-day window.
        assert_eq!(periods.len(), 9);
        let first = periods[0];
        assert_eq!(first.index, 1);
        assert_eq!(first.train_range(), "20220101-20220401");
        assert_eq!(first.test_range(), "20220401-20220501");
        assert_eq!(periods[1].train_start, date("20220131"));
        assert!(periods.iter().all(|p| p.test_end <= date("20230101")));
        assert_eq!(periods.last().unwrap().index, 9);
    }

    #[test]
    fn a_range_shorter_than_one_window_yields_nothing() {
        let periods = generate_periods(date("20220101"), date("20220301"), 3, 1, 1).unwrap();
        assert!(periods.is_empty());
    }

    #[test]
    fn zero_lengths_and_reversed_ranges_are_rejected() {
        assert!(generate_periods(date("20220101"), date("20230101"), 3, 1, 0).is_err());
        assert!(generate_periods(date("20230101"), date("20220101"), 3, 1, 1).is_err());
    }

    #[test]
    fn month_counts_past_the_calendar_are_errors() {
        let err = generate_periods(date("20220101"), date("20230101"), u32::MAX, 1, 1).unwrap_err();
        assert!(matches!(err, WfoError::DateError(ref msg) if msg.contains("out of the supported date range")));
        assert!(generate_periods(date("20220101"), date("20230101"), 3, u32::MAX, 1).is_err());
        assert!(generate_periods(date("20220101"), date("20230101"), 3, 1, u32::MAX).is_err());
        assert!(parse_date("2022-01-01").is_err());
    }

    #[test]
    fn renders_all_three_formats() {
        let periods = generate_periods(date("20220101"), date("20220801"), 3, 1, 2).unwrap();
        assert_eq!(periods.len(), 2);

        let bash = render_periods(&periods, PeriodFormat::Bash).unwrap();
        assert!(bash.starts_with("# Generated 2 walk-forward validation periods"));
        assert!(bash.contains("TRAIN_RANGE_1=\"20220101-20220401\""));
        assert!(bash.contains("TEST_RANGE_2=\"20220531-20220630\""));

        let json: serde_json::Value =
            serde_json::from_str(&render_periods(&periods, PeriodFormat::Json).unwrap()).unwrap();
        assert_eq!(json[1]["period"], 2);
        assert_eq!(json[1]["train_start"], "20220302");

        let csv = render_periods(&periods, PeriodFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "period,train_start,train_end,test_start,test_end");
        assert_eq!(lines[1], "1,20220101,20220401,20220401,20220501");
        assert_eq!(lines.len(), 3);
    }
}
