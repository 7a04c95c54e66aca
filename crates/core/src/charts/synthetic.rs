//! Deterministic placeholder series.
//!
//! Used when the upstream cannot deliver data for a symbol. The walk is seeded
//! from the symbol's characters, so the same symbol always yields the same
//! shape and a chart does not jump around between refreshes.

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use chartsync_market_data::{TimeSeriesPoint, Timeframe, Timespan};

use crate::constants::SYNTHETIC_DECIMAL_PRECISION;

/// Largest relative move between two consecutive synthetic points.
const MAX_STEP: f64 = 0.02;

fn seed_for(symbol: &str) -> u64 {
    symbol
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
}

/// Generate a placeholder series for `symbol` covering `timeframe` up to `today`.
///
/// Points follow the timeframe's bar size (daily or weekly), ascending.
pub fn synthetic_series(symbol: &str, timeframe: Timeframe, today: NaiveDate) -> Vec<TimeSeriesPoint> {
    let seed = seed_for(symbol);
    let mut rng = StdRng::seed_from_u64(seed);

    let step = match timeframe.bar_timespan() {
        Timespan::Day => Days::new(1),
        Timespan::Week => Days::new(7),
    };
    let (from, to) = timeframe.date_range(today);

    let mut value = 20.0 + (seed % 480) as f64;
    let mut points = Vec::new();
    let mut date = from;
    while date <= to {
        let point_value = Decimal::from_f64(value)
            .unwrap_or_default()
            .round_dp(SYNTHETIC_DECIMAL_PRECISION);
        points.push(TimeSeriesPoint::new(date, point_value));

        value *= 1.0 + rng.gen_range(-MAX_STEP..MAX_STEP);
        date = match date.checked_add_days(step) {
            Some(next) => next,
            None => break,
        };
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    #[test]
    fn test_same_symbol_same_series() {
        let tf = Timeframe::parse("1m").unwrap();
        assert_eq!(
            synthetic_series("AAPL", tf, today()),
            synthetic_series("AAPL", tf, today())
        );
    }

    #[test]
    fn test_different_symbols_differ() {
        let tf = Timeframe::parse("1m").unwrap();
        assert_ne!(
            synthetic_series("AAPL", tf, today()),
            synthetic_series("MSFT", tf, today())
        );
    }

    #[test]
    fn test_covers_range_ascending() {
        let tf = Timeframe::parse("7d").unwrap();
        let points = synthetic_series("AAPL", tf, today());
        assert_eq!(points.len(), 8);
        assert_eq!(points.first().unwrap().date, NaiveDate::from_ymd_opt(2024, 6, 21).unwrap());
        assert_eq!(points.last().unwrap().date, today());
        assert!(points.windows(2).all(|w| w[0].date < w[1].date));
        assert!(points.iter().all(|p| p.value > Decimal::ZERO));
    }

    #[test]
    fn test_multi_year_uses_weekly_points() {
        let tf = Timeframe::parse("2y").unwrap();
        let points = synthetic_series("AAPL", tf, today());
        assert!(points.windows(2).all(|w| (w[1].date - w[0].date).num_days() == 7));
    }
}
