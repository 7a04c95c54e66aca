use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::aggregate::{AggregatesRequest, Timespan};
use crate::errors::MarketDataError;

/// Lookback used when a timeframe string cannot be parsed.
pub const DEFAULT_TIMEFRAME_DAYS: u32 = 30;

/// Longest accepted lookback, in days (fifty years).
pub const MAX_TIMEFRAME_DAYS: u64 = 50 * 366;

/// Unit component of a timeframe string (`d`, `w`, `m`, `y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeframeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TimeframeUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            'm' => Some(Self::Month),
            'y' => Some(Self::Year),
            _ => None,
        }
    }

    /// Approximate days per unit (months count as 31).
    fn days(self) -> u64 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 31,
            Self::Year => 366,
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Day => 'd',
            Self::Week => 'w',
            Self::Month => 'm',
            Self::Year => 'y',
        }
    }
}

/// A count + unit lookback such as `1m` (one month) or `5y`.
///
/// The timeframe decides three things: the date range requested upstream,
/// the bar granularity, and how often a chart built on it is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    count: u32,
    unit: TimeframeUnit,
}

impl Timeframe {
    /// Rejects a zero count and lookbacks longer than [`MAX_TIMEFRAME_DAYS`].
    pub fn new(count: u32, unit: TimeframeUnit) -> Result<Self, MarketDataError> {
        if count == 0 || u64::from(count) * unit.days() > MAX_TIMEFRAME_DAYS {
            return Err(MarketDataError::InvalidTimeframe(format!(
                "{}{}",
                count,
                unit.as_char()
            )));
        }
        Ok(Self { count, unit })
    }

    /// Strictly parse `^(\d+)([dwmy])$`.
    pub fn parse(input: &str) -> Result<Self, MarketDataError> {
        let invalid = || MarketDataError::InvalidTimeframe(input.to_string());

        let mut chars = input.chars();
        let unit = chars
            .next_back()
            .and_then(TimeframeUnit::from_char)
            .ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let count: u32 = digits.parse().map_err(|_| invalid())?;
        Self::new(count, unit).map_err(|_| invalid())
    }

    /// Parse, falling back to a 30-day daily lookback for unrecognized input.
    pub fn parse_or_default(input: &str) -> Self {
        Self::parse(input).unwrap_or_else(|_| {
            log::debug!(
                "Unrecognized timeframe '{}', using {}d",
                input,
                DEFAULT_TIMEFRAME_DAYS
            );
            Self::default()
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    /// Approximate length of the lookback in days (months count as 31).
    pub fn span_days(&self) -> u64 {
        u64::from(self.count) * self.unit.days()
    }

    /// Inclusive `(from, to)` calendar range ending on `today`.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let from = match self.unit {
            TimeframeUnit::Day => today.checked_sub_days(Days::new(u64::from(self.count))),
            TimeframeUnit::Week => today.checked_sub_days(Days::new(u64::from(self.count) * 7)),
            TimeframeUnit::Month => today.checked_sub_months(Months::new(self.count)),
            TimeframeUnit::Year => self
                .count
                .checked_mul(12)
                .and_then(|months| today.checked_sub_months(Months::new(months))),
        };
        (from.unwrap_or(NaiveDate::MIN), today)
    }

    /// Bar size requested upstream. Multi-year ranges use weekly bars; everything
    /// else uses daily bars so each calendar date appears at most once.
    pub fn bar_timespan(&self) -> Timespan {
        match self.unit {
            TimeframeUnit::Year if self.count > 1 => Timespan::Week,
            _ => Timespan::Day,
        }
    }

    /// How often a chart on this timeframe is re-fetched.
    ///
    /// Long ranges change slowly upstream, so they poll less.
    pub fn refresh_interval(&self) -> Duration {
        match self.span_days() {
            0..=7 => Duration::from_secs(15),
            8..=31 => Duration::from_secs(45),
            32..=93 => Duration::from_secs(5 * 60),
            94..=186 => Duration::from_secs(15 * 60),
            _ => Duration::from_secs(60 * 60),
        }
    }

    /// Build the upstream aggregates request for `symbol` as of `today`.
    pub fn to_request(&self, symbol: &str, today: NaiveDate) -> AggregatesRequest {
        let (from, to) = self.date_range(today);
        AggregatesRequest {
            symbol: symbol.to_string(),
            multiplier: 1,
            timespan: self.bar_timespan(),
            from,
            to,
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self {
            count: DEFAULT_TIMEFRAME_DAYS,
            unit: TimeframeUnit::Day,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.as_char())
    }
}

impl FromStr for Timeframe {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = MarketDataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.to_string()
    }
}
