use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Bar size of an aggregates request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    Day,
    Week,
}

impl Timespan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

/// Parameters of a single upstream aggregates call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregatesRequest {
    pub symbol: String,
    pub multiplier: u32,
    pub timespan: Timespan,
    /// Start of the range (inclusive)
    pub from: NaiveDate,
    /// End of the range (inclusive)
    pub to: NaiveDate,
}

/// One OHLCV bar as returned upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Bar start, epoch milliseconds
    pub t: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<f64>,
    /// Close price (required)
    pub c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<f64>,
    /// Volume-weighted average price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vw: Option<f64>,
    /// Number of trades in the bar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,
}

impl Aggregate {
    /// Convenience constructor for a close-only bar.
    pub fn close_only(t: i64, c: f64) -> Self {
        Self {
            t,
            o: None,
            h: None,
            l: None,
            c,
            v: None,
            vw: None,
            n: None,
        }
    }
}

/// Envelope of an aggregates response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatesResponse {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results_count: Option<u64>,
    /// Error text sent alongside an `ERROR` status
    #[serde(default)]
    pub error: Option<String>,
    /// Absent when the provider has no data for the range
    #[serde(default)]
    pub results: Option<Vec<Aggregate>>,
}

impl AggregatesResponse {
    pub fn with_results(results: Vec<Aggregate>) -> Self {
        Self {
            results_count: Some(results.len() as u64),
            results: Some(results),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_polygon_payload() {
        let body = r#"{
            "ticker": "AAPL",
            "queryCount": 2,
            "resultsCount": 2,
            "adjusted": true,
            "status": "OK",
            "results": [
                {"v": 70790813.0, "vw": 131.6292, "o": 130.465, "c": 130.15, "h": 133.41, "l": 129.89, "t": 1673240400000, "n": 645365},
                {"v": 63896155.0, "vw": 129.822, "o": 130.26, "c": 133.49, "h": 133.93, "l": 127.73, "t": 1673326800000, "n": 520781}
            ]
        }"#;

        let resp: AggregatesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.ticker.as_deref(), Some("AAPL"));
        assert_eq!(resp.results_count, Some(2));
        let bars = resp.results.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].c, 130.15);
        assert_eq!(bars[1].n, Some(520781));
    }

    #[test]
    fn test_missing_results_deserializes_to_none() {
        let resp: AggregatesResponse =
            serde_json::from_str(r#"{"ticker":"ZZZZ","status":"OK","resultsCount":0}"#).unwrap();
        assert!(resp.results.is_none());
    }

    #[test]
    fn test_bar_without_close_is_rejected() {
        let result: Result<Aggregate, _> = serde_json::from_str(r#"{"t": 1, "o": 1.0}"#);
        assert!(result.is_err());
    }
}
