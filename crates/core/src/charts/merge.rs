//! Alignment of several series onto one date axis.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use chartsync_market_data::TimeSeriesPoint;

use super::model::MergedRow;

/// Merge named series onto the union of their dates, ascending.
///
/// Every row carries a value slot for every series name; a series without a
/// point on that date contributes `None`. Nothing is interpolated.
pub fn align_series(series: &[(String, Vec<TimeSeriesPoint>)]) -> Vec<MergedRow> {
    let dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|(_, points)| points.iter().map(|p| p.date))
        .collect();

    let lookups: Vec<(&str, BTreeMap<NaiveDate, Decimal>)> = series
        .iter()
        .map(|(name, points)| {
            (
                name.as_str(),
                points.iter().map(|p| (p.date, p.value)).collect(),
            )
        })
        .collect();

    dates
        .into_iter()
        .map(|date| MergedRow {
            date,
            values: lookups
                .iter()
                .map(|(name, by_date)| (name.to_string(), by_date.get(&date).copied()))
                .collect(),
        })
        .collect()
}
