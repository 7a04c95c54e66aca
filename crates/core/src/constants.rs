/// Chart id that receives every update and removal.
pub const WILDCARD_CHART_ID: &str = "*";

/// Separator between the symbol list and the timeframe in a chart id (`AAPL_1m`).
pub const CHART_ID_TIMEFRAME_SEPARATOR: char = '_';

/// Separator between symbols of a comparison chart id (`AAPL,MSFT_1y`).
pub const CHART_ID_SYMBOL_SEPARATOR: char = ',';

/// Key prefix of persisted chart payloads.
pub const PERSISTED_CHART_PREFIX: &str = "chart:";

/// Key of the persisted index mapping chart id to write time.
pub const PERSISTED_INDEX_KEY: &str = "chart-index";

/// Decimal places kept for synthetic values.
pub const SYNTHETIC_DECIMAL_PRECISION: u32 = 2;

/// Key under which a single-series chart plots its x axis.
pub const X_AXIS_KEY: &str = "date";

/// Key under which a single-series chart plots its y axis.
pub const Y_AXIS_KEY: &str = "value";
