use crate::error::{BacktestError, BacktestResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Parses the timestamp formats found in exported OHLCV files.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|value| value.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp '{}'", raw)))
}

/// Per-bar position instruction: hold a long position or stay flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Signal {
    #[default]
    Flat,
    Long,
}

impl From<bool> for Signal {
    fn from(long: bool) -> Self {
        if long {
            Signal::Long
        } else {
            Signal::Flat
        }
    }
}

/// Converts raw integer signals, rejecting anything outside {0, 1}.
pub fn signals_from_raw(raw: &[i64]) -> BacktestResult<Vec<Signal>> {
    raw.iter()
        .enumerate()
        .map(|(index, &value)| match value {
            0 => Ok(Signal::Flat),
            1 => Ok(Signal::Long),
            value => Err(BacktestError::InvalidSignal { index, value }),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub equity_curve: Vec<f64>,
    pub closed_trade_pnls: Vec<f64>,
    pub final_equity: f64,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub bars_in_position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquityPoint {
    pub timestamp: String,
    pub equity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_supported_timestamp_formats() {
        let spaced = parse_timestamp("2024-03-05 13:00:00").expect("spaced format");
        assert_eq!(spaced.hour(), 13);
        let rfc = parse_timestamp("2024-03-05T13:00:00+00:00").expect("rfc3339");
        assert_eq!(rfc, spaced);
        let date_only = parse_timestamp("2024-03-05").expect("date only");
        assert_eq!(date_only.day(), 5);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn rejects_out_of_range_signals() {
        let parsed = signals_from_raw(&[0, 1, 1, 0]).unwrap();
        assert_eq!(
            parsed,
            vec![Signal::Flat, Signal::Long, Signal::Long, Signal::Flat]
        );

        let err = signals_from_raw(&[1, 0, 2]).unwrap_err();
        assert_eq!(err, BacktestError::InvalidSignal { index: 2, value: 2 });
        assert!(signals_from_raw(&[-1]).is_err());
    }
}
