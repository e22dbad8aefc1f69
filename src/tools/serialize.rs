use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::time::Instant;

use crate::data::frame::{ColumnKey, PriceTable};
use crate::data::types::{DownloadRequest, Field, GroupBy};

use super::response_types::{
    DateRange, DownloadMetadata, DownloadResult, StockSummary, TickerStats,
};

const DATE_KEY: &str = "date";

/// Shape the downloaded table into `{data, summary, metadata}`.
pub fn build_result(
    table: PriceTable,
    request: &DownloadRequest,
    warnings: Vec<String>,
    data_source: &str,
    started: Instant,
) -> Result<DownloadResult> {
    let table = if request.keepna {
        table
    } else {
        table.drop_empty_rows()?
    };
    if table.is_empty() {
        bail!("No data found for ticker(s): {}", request.tickers.join(" "));
    }

    let dates: Vec<String> = table
        .index()?
        .into_iter()
        .map(|ts| format_timestamp(ts, table.is_intraday()))
        .collect();

    let layout = Layout::new(&table, request.group_by);
    let data = build_rows(&table, &layout, &dates)?;
    let summary = build_summary(&table, &dates)?;

    let metadata = DownloadMetadata {
        shape: [dates.len(), layout.columns.len()],
        columns: layout.columns.iter().map(|k| layout.label(k)).collect(),
        tickers: table.tickers().to_vec(),
        interval: request.interval.to_string(),
        period: request.span_label(),
        group_by: request.group_by.as_str().to_string(),
        date_range: DateRange {
            start: dates.first().cloned(),
            end: dates.last().cloned(),
        },
        warnings,
        data_source: data_source.to_string(),
        processing_time_ms: started.elapsed().as_millis() as u64,
        generated_at: Utc::now().to_rfc3339(),
    };

    Ok(DownloadResult {
        data,
        summary,
        metadata,
    })
}

/// Column order and nesting for the output.
struct Layout {
    single: bool,
    group_by: GroupBy,
    columns: Vec<ColumnKey>,
}

impl Layout {
    fn new(table: &PriceTable, group_by: GroupBy) -> Self {
        let tickers = table.tickers();
        let columns = match group_by {
            GroupBy::Ticker => tickers
                .iter()
                .flat_map(|t| {
                    table
                        .fields_for(t)
                        .into_iter()
                        .map(move |f| ColumnKey::new(t.as_str(), f))
                })
                .collect(),
            GroupBy::Column => table
                .fields()
                .into_iter()
                .flat_map(|f| {
                    tickers
                        .iter()
                        .map(move |t| ColumnKey::new(t.as_str(), f))
                })
                .filter(|k| table.columns().contains(k))
                .collect(),
        };
        Self {
            single: tickers.len() == 1,
            group_by,
            columns,
        }
    }

    fn label(&self, key: &ColumnKey) -> String {
        let field = key.field.name();
        if self.single {
            field.to_string()
        } else {
            match self.group_by {
                GroupBy::Ticker => format!("{}:{field}", key.ticker),
                GroupBy::Column => format!("{field}:{}", key.ticker),
            }
        }
    }

    /// Outer and inner keys of a value within a row.
    fn path<'a>(&self, key: &'a ColumnKey) -> (&'a str, Option<&'a str>) {
        let field = key.field.name();
        if self.single {
            (field, None)
        } else {
            match self.group_by {
                GroupBy::Ticker => (key.ticker.as_str(), Some(field)),
                GroupBy::Column => (field, Some(key.ticker.as_str())),
            }
        }
    }
}

fn build_rows(table: &PriceTable, layout: &Layout, dates: &[String]) -> Result<Vec<Value>> {
    let mut rows: Vec<Map<String, Value>> = dates
        .iter()
        .map(|d| {
            let mut row = Map::new();
            row.insert(DATE_KEY.to_string(), Value::String(d.clone()));
            row
        })
        .collect();

    for key in &layout.columns {
        let values = table.values(key)?;
        let (outer, inner) = layout.path(key);
        for (row, value) in rows.iter_mut().zip(values) {
            match inner {
                None => {
                    row.insert(outer.to_string(), json!(value));
                }
                Some(inner) => {
                    let slot = row
                        .entry(outer.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(nested) = slot {
                        nested.insert(inner.to_string(), json!(value));
                    }
                }
            }
        }
    }

    Ok(rows.into_iter().map(Value::Object).collect())
}

fn build_summary(table: &PriceTable, dates: &[String]) -> Result<StockSummary> {
    let mut tickers = Vec::with_capacity(table.tickers().len());
    for ticker in table.tickers() {
        let key = ColumnKey::new(ticker.as_str(), Field::Close);
        if !table.columns().contains(&key) {
            continue;
        }
        let stats = table.stats(&key)?;
        let change_pct = match (stats.first, stats.last) {
            (Some(first), Some(last)) if first != 0.0 => Some((last - first) / first * 100.0),
            _ => None,
        };
        tickers.push(TickerStats {
            ticker: ticker.clone(),
            column: Field::Close.name().to_string(),
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
            first: stats.first,
            last: stats.last,
            change_pct,
        });
    }

    Ok(StockSummary {
        start_date: dates.first().cloned(),
        end_date: dates.last().cloned(),
        total_records: dates.len(),
        tickers,
    })
}

/// Dates for daily-or-coarser bars, wall-clock time for intraday ones.
fn format_timestamp(ts: i64, intraday: bool) -> String {
    let Some(dt) = DateTime::from_timestamp(ts, 0) else {
        return ts.to_string();
    };
    let naive = dt.naive_utc();
    if intraday {
        naive.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        naive.format("%Y-%m-%d").to_string()
    }
}
