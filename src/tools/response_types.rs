use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Response for `download_stock_data`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadResult {
    /// One object per bar: `date` plus values, flat for a single ticker,
    /// nested by ticker or by field for several.
    pub data: Vec<serde_json::Value>,
    pub summary: StockSummary,
    pub metadata: DownloadMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StockSummary {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub total_records: usize,
    /// Close-price statistics per ticker, in request order.
    pub tickers: Vec<TickerStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TickerStats {
    pub ticker: String,
    pub column: String,
    /// Non-missing values
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub first: Option<f64>,
    pub last: Option<f64>,
    /// Percent change from first to last value
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadMetadata {
    /// `[rows, columns]`
    pub shape: [usize; 2],
    pub columns: Vec<String>,
    pub tickers: Vec<String>,
    pub interval: String,
    pub period: String,
    pub group_by: String,
    pub date_range: DateRange,
    pub warnings: Vec<String>,
    pub data_source: String,
    pub processing_time_ms: u64,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}
