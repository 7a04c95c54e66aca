use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregate::Aggregate;
use crate::errors::MarketDataError;

/// Decimal places kept when converting upstream floats.
const PRICE_SCALE: u32 = 6;

/// One normalized point of a price series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Calendar date, serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    /// Plotted value (the close)
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

impl TimeSeriesPoint {
    pub fn new(date: NaiveDate, value: Decimal) -> Self {
        Self {
            date,
            value,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }
}

/// Whether a series came from the provider or was generated as a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Real,
    Synthetic,
}

impl DataSource {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataSource::Synthetic)
    }

    /// Combined source of several series: synthetic if any part is.
    pub fn combine(sources: impl IntoIterator<Item = DataSource>) -> DataSource {
        if sources.into_iter().any(|s| s.is_synthetic()) {
            DataSource::Synthetic
        } else {
            DataSource::Real
        }
    }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(value).map(|d| d.round_dp(PRICE_SCALE).normalize())
}

/// Convert upstream bars into an ascending, date-unique point series.
///
/// Bars falling on the same calendar date collapse to the last one received.
/// A `None` or empty bar list is an [`MarketDataError::UpstreamData`].
pub fn normalize_aggregates(
    symbol: &str,
    bars: Option<Vec<Aggregate>>,
) -> Result<Vec<TimeSeriesPoint>, MarketDataError> {
    let bars = bars.ok_or_else(|| MarketDataError::UpstreamData {
        symbol: symbol.to_string(),
        message: "response has no results".to_string(),
    })?;

    let mut by_date: BTreeMap<NaiveDate, TimeSeriesPoint> = BTreeMap::new();
    for bar in bars {
        let date = DateTime::from_timestamp_millis(bar.t)
            .map(|ts| ts.date_naive())
            .ok_or_else(|| MarketDataError::UpstreamData {
                symbol: symbol.to_string(),
                message: format!("invalid bar timestamp {}", bar.t),
            })?;
        let close = to_decimal(bar.c).ok_or_else(|| MarketDataError::UpstreamData {
            symbol: symbol.to_string(),
            message: format!("invalid close {}", bar.c),
        })?;

        by_date.insert(
            date,
            TimeSeriesPoint {
                date,
                value: close,
                open: bar.o.and_then(to_decimal),
                high: bar.h.and_then(to_decimal),
                low: bar.l.and_then(to_decimal),
                close: Some(close),
                volume: bar.v.and_then(to_decimal),
            },
        );
    }

    if by_date.is_empty() {
        return Err(MarketDataError::UpstreamData {
            symbol: symbol.to_string(),
            message: "response has empty results".to_string(),
        });
    }

    Ok(by_date.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const DAY_MS: i64 = 86_400_000;
    // 2023-01-09T00:00:00Z
    const JAN_9: i64 = 1_673_222_400_000;

    #[test]
    fn test_normalize_sorts_and_maps_fields() {
        let bars = vec![
            Aggregate {
                t: JAN_9 + DAY_MS,
                o: Some(130.26),
                h: Some(133.93),
                l: Some(127.73),
                c: 133.49,
                v: Some(63896155.0),
                vw: Some(129.822),
                n: Some(520781),
            },
            Aggregate::close_only(JAN_9, 130.15),
        ];

        let points = normalize_aggregates("AAPL", Some(bars)).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date.to_string(), "2023-01-09");
        assert_eq!(points[0].value, dec!(130.15));
        assert!(points[0].open.is_none());
        assert_eq!(points[1].date.to_string(), "2023-01-10");
        assert_eq!(points[1].open, Some(dec!(130.26)));
        assert_eq!(points[1].close, Some(dec!(133.49)));
        assert_eq!(points[1].volume, Some(dec!(63896155)));
    }

    #[test]
    fn test_normalize_collapses_same_day_bars() {
        let bars = vec![
            Aggregate::close_only(JAN_9, 10.0),
            Aggregate::close_only(JAN_9 + 3_600_000, 11.5),
        ];
        let points = normalize_aggregates("MSFT", Some(bars)).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, dec!(11.5));
    }

    #[test]
    fn test_normalize_rejects_missing_and_empty_results() {
        let err = normalize_aggregates("AAPL", None).unwrap_err();
        assert!(matches!(err, MarketDataError::UpstreamData { .. }));

        let err = normalize_aggregates("AAPL", Some(vec![])).unwrap_err();
        assert!(matches!(err, MarketDataError::UpstreamData { .. }));
    }

    #[test]
    fn test_data_source_combine() {
        assert_eq!(
            DataSource::combine([DataSource::Real, DataSource::Real]),
            DataSource::Real
        );
        assert_eq!(
            DataSource::combine([DataSource::Real, DataSource::Synthetic]),
            DataSource::Synthetic
        );
        assert_eq!(
            serde_json::to_string(&DataSource::Synthetic).unwrap(),
            "\"synthetic\""
        );
    }
}
