//! Chart domain models.
//!
//! A chart is published as a [`ChartPayload`]: one [`ChartResult`] (single
//! series or aligned comparison) plus its data source and publish time.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use chartsync_market_data::{DataSource, TimeSeriesPoint, Timeframe};

use super::merge::align_series;
use crate::constants::{
    CHART_ID_SYMBOL_SEPARATOR, CHART_ID_TIMEFRAME_SEPARATOR, WILDCARD_CHART_ID, X_AXIS_KEY,
    Y_AXIS_KEY,
};
use crate::errors::{Error, Result};

// =============================================================================
// Chart Spec
// =============================================================================

/// What a chart plots: one or more symbols over a timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartSpec {
    symbols: Vec<String>,
    timeframe: Timeframe,
}

impl ChartSpec {
    /// Build a spec, upper-casing symbols and dropping blanks and duplicates.
    pub fn new<I, S>(symbols: I, timeframe: Timeframe) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref().trim().to_uppercase();
            if !symbol.is_empty() && !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }
        if unique.is_empty() {
            return Err(Error::InvalidChartId("no symbols".to_string()));
        }
        Ok(Self {
            symbols: unique,
            timeframe,
        })
    }

    pub fn single(symbol: &str, timeframe: Timeframe) -> Result<Self> {
        Self::new([symbol], timeframe)
    }

    /// Parse a chart id of the form `SYMBOL_TF` or `SYM1,SYM2_TF`.
    ///
    /// Ids without a valid timeframe suffix, and the wildcard id, are not
    /// schedulable and yield [`Error::InvalidChartId`].
    pub fn parse_chart_id(chart_id: &str) -> Result<Self> {
        let invalid = || Error::InvalidChartId(chart_id.to_string());
        if chart_id == WILDCARD_CHART_ID {
            return Err(invalid());
        }
        let (symbols, timeframe) = chart_id
            .rsplit_once(CHART_ID_TIMEFRAME_SEPARATOR)
            .ok_or_else(invalid)?;
        let timeframe = Timeframe::parse(timeframe).map_err(|_| invalid())?;
        Self::new(symbols.split(CHART_ID_SYMBOL_SEPARATOR), timeframe).map_err(|_| invalid())
    }

    /// Canonical chart id for this spec.
    pub fn chart_id(&self) -> String {
        format!(
            "{}{}{}",
            self.symbols.join(&CHART_ID_SYMBOL_SEPARATOR.to_string()),
            CHART_ID_TIMEFRAME_SEPARATOR,
            self.timeframe
        )
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn is_comparison(&self) -> bool {
        self.symbols.len() > 1
    }
}

impl fmt::Display for ChartSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.chart_id())
    }
}

// =============================================================================
// Chart Results
// =============================================================================

/// Line metadata of one series inside a comparison chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMeta {
    pub name: String,
    pub data_key: String,
}

/// One row of an aligned comparison: a date plus one value per symbol.
///
/// Symbols without a point on `date` carry `None` (serialized as `null`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<Decimal>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSeriesConfig {
    pub data: Vec<TimeSeriesPoint>,
    pub x_key: String,
    pub y_key: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonConfig {
    pub data: Vec<MergedRow>,
    pub x_key: String,
    pub title: String,
}

/// The renderable result of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartResult {
    Single {
        config: SingleSeriesConfig,
    },
    Comparison {
        config: ComparisonConfig,
        series: Vec<SeriesMeta>,
    },
}

impl ChartResult {
    pub fn is_comparison(&self) -> bool {
        matches!(self, ChartResult::Comparison { .. })
    }

    /// Number of plotted rows.
    pub fn len(&self) -> usize {
        match self {
            ChartResult::Single { config } => config.data.len(),
            ChartResult::Comparison { config, .. } => config.data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Chart Payload
// =============================================================================

/// What subscribers receive for a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPayload {
    pub result: ChartResult,
    /// Synthetic if any plotted series is a placeholder.
    pub source: DataSource,
    pub updated_at: DateTime<Utc>,
}

impl ChartPayload {
    /// Single-series chart of `symbol` over `timeframe`.
    pub fn single(
        symbol: &str,
        timeframe: Timeframe,
        points: Vec<TimeSeriesPoint>,
        source: DataSource,
    ) -> Self {
        Self {
            result: ChartResult::Single {
                config: SingleSeriesConfig {
                    data: points,
                    x_key: X_AXIS_KEY.to_string(),
                    y_key: Y_AXIS_KEY.to_string(),
                    title: format!("{} ({})", symbol, timeframe),
                },
            },
            source,
            updated_at: Utc::now(),
        }
    }

    /// Comparison chart aligning `series` on the union of their dates.
    ///
    /// Series order decides legend order.
    pub fn comparison(
        timeframe: Timeframe,
        series: &[(String, Vec<TimeSeriesPoint>)],
        source: DataSource,
    ) -> Self {
        let names: Vec<&str> = series.iter().map(|(name, _)| name.as_str()).collect();
        let meta = series
            .iter()
            .map(|(name, _)| SeriesMeta {
                name: name.clone(),
                data_key: name.clone(),
            })
            .collect();

        Self {
            result: ChartResult::Comparison {
                config: ComparisonConfig {
                    data: align_series(series),
                    x_key: X_AXIS_KEY.to_string(),
                    title: format!("{} ({})", names.join(" vs "), timeframe),
                },
                series: meta,
            },
            source,
            updated_at: Utc::now(),
        }
    }
}
