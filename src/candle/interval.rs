//! Candle interval (bar granularity)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bar granularity accepted by the market data API.
///
/// The serialized form is the variant name, which is also the wire value the
/// API expects and the value persisted in the `interval` column.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Interval {
    #[default]
    OneMinute,
    TwoMinutes,
    ThreeMinutes,
    FourMinutes,
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    TwentyMinutes,
    HalfHour,
    OneHour,
    TwoHours,
    FourHours,
    OneDay,
    OneWeek,
    OneMonth,
    OneYear,
}

/// Error returned when a string is not a known interval
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown candle interval: {0:?}")]
pub struct ParseIntervalError(pub String);

impl Interval {
    /// Every interval, finest first
    pub const ALL: [Interval; 16] = [
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::ThreeMinutes,
        Interval::FourMinutes,
        Interval::FiveMinutes,
        Interval::TenMinutes,
        Interval::FifteenMinutes,
        Interval::TwentyMinutes,
        Interval::HalfHour,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::OneDay,
        Interval::OneWeek,
        Interval::OneMonth,
        Interval::OneYear,
    ];

    /// Wire / storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "OneMinute",
            Interval::TwoMinutes => "TwoMinutes",
            Interval::ThreeMinutes => "ThreeMinutes",
            Interval::FourMinutes => "FourMinutes",
            Interval::FiveMinutes => "FiveMinutes",
            Interval::TenMinutes => "TenMinutes",
            Interval::FifteenMinutes => "FifteenMinutes",
            Interval::TwentyMinutes => "TwentyMinutes",
            Interval::HalfHour => "HalfHour",
            Interval::OneHour => "OneHour",
            Interval::TwoHours => "TwoHours",
            Interval::FourHours => "FourHours",
            Interval::OneDay => "OneDay",
            Interval::OneWeek => "OneWeek",
            Interval::OneMonth => "OneMonth",
            Interval::OneYear => "OneYear",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Interval::ALL
            .iter()
            .copied()
            .find(|interval| interval.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseIntervalError(s.to_string()))
    }
}
