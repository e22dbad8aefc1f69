//! Yahoo Finance chart provider.
//!
//! One `GET /v8/finance/chart/{symbol}` per ticker. Key behaviour:
//!
//! - **Window**: `start` wins over `period`; an `end` without `start` counts
//!   `period` back from `end`; otherwise Yahoo's own `range` is used.
//! - **Adjustment**: with `auto_adjust`, open/high/low are scaled by
//!   `adjclose / close` and close is replaced by the adjusted close.
//! - **Actions**: dividends and split ratios land on the first bar of the
//!   day they occurred, zero elsewhere.
//! - **Threads**: tickers are fetched concurrently when requested.
//!
//! No retries and no rate limiting: a failed ticker fails the whole call.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::frame::{PriceTable, TickerSeries};
use super::types::{DownloadRequest, Field};
use super::Downloader;
use crate::config::Config;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const SOURCE_NAME: &str = "Yahoo Finance";
const SECS_PER_DAY: i64 = 86_400;
const ROUND_FACTOR: f64 = 100.0;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    events: Option<ChartEvents>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct YahooProvider {
    client: Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.yahoo_base_url, &config.user_agent)
    }

    async fn fetch_series(&self, symbol: &str, request: &DownloadRequest) -> Result<TickerSeries> {
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        let params = chart_query(request, Utc::now());
        tracing::debug!(%symbol, ?params, "Requesting Yahoo chart");

        let resp = self
            .client
            .get(&url)
            .query(&params)
            .timeout(request.timeout)
            .send()
            .await
            .with_context(|| format!("{symbol}: request to Yahoo Finance failed"))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("{symbol}: failed to read Yahoo Finance response"))?;

        let result = parse_chart(symbol, status, &body)?;
        build_series(symbol, result, request)
    }
}

#[async_trait]
impl Downloader for YahooProvider {
    async fn download(&self, request: &DownloadRequest) -> Result<PriceTable> {
        let fetches = request
            .tickers
            .iter()
            .map(|ticker| self.fetch_series(ticker, request));

        let results = if request.threads {
            join_all(fetches).await
        } else {
            let mut out = Vec::with_capacity(request.tickers.len());
            for fetch in fetches {
                out.push(fetch.await);
            }
            out
        };

        let mut series = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (ticker, result) in request.tickers.iter().zip(results) {
            match result {
                Ok(s) => series.push(s),
                Err(e) => {
                    tracing::warn!(%ticker, "Yahoo download failed: {e:#}");
                    failures.push(format!("{e:#}"));
                }
            }
        }

        if !failures.is_empty() {
            bail!(
                "{} of {} ticker(s) failed to download: {}",
                failures.len(),
                request.tickers.len(),
                failures.join("; ")
            );
        }

        PriceTable::from_series(series, request.interval.is_intraday())
    }

    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn notes(&self, request: &DownloadRequest) -> Vec<String> {
        let mut notes = Vec::new();
        if request.repair {
            notes.push(
                "repair is not supported by the Yahoo Finance chart provider; \
                 prices are returned as published."
                    .to_string(),
            );
        }
        if request.period.is_some() && request.start.is_some() {
            notes.push("start/end take precedence over period.".to_string());
        } else if request.period.is_some() && request.end.is_some() {
            notes.push("period is counted back from end.".to_string());
        }
        notes
    }
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

fn midnight_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp())
}

fn day_number(date: NaiveDate) -> i64 {
    midnight_ts(date).div_euclid(SECS_PER_DAY)
}

/// Exchange-local days `[from, until)` the request covers, if it names dates.
fn local_window(request: &DownloadRequest) -> Option<(NaiveDate, Option<NaiveDate>)> {
    match (request.start, request.end) {
        (Some(start), end) => Some((start, end)),
        (None, Some(end)) => Some((request.effective_period().start_before(end), Some(end))),
        (None, None) => None,
    }
}

/// [`local_window`] as day numbers; an open end is `i64::MAX`.
fn window_days(request: &DownloadRequest) -> Option<(i64, i64)> {
    local_window(request).map(|(from, until)| (day_number(from), until.map_or(i64::MAX, day_number)))
}

/// Query string for the chart endpoint.
///
/// `period1`/`period2` are UTC instants but bars belong to exchange-local
/// days, so explicit windows are widened by a day on each side and trimmed
/// back in [`build_series`].
fn chart_query(request: &DownloadRequest, now: DateTime<Utc>) -> Vec<(String, String)> {
    let mut params = vec![("interval".to_string(), request.interval.as_str().to_string())];

    match local_window(request) {
        Some((from, until)) => {
            let period1 = (midnight_ts(from) - SECS_PER_DAY).max(0);
            let period2 =
                until.map_or_else(|| now.timestamp(), |d| midnight_ts(d) + SECS_PER_DAY);
            params.push(("period1".into(), period1.to_string()));
            params.push(("period2".into(), period2.to_string()));
        }
        None => {
            params.push(("range".into(), request.effective_period().as_str().to_string()));
        }
    }

    params.push(("includePrePost".into(), request.prepost.to_string()));
    if request.actions {
        params.push(("events".into(), "div,splits".into()));
    }
    params
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn parse_chart(symbol: &str, status: u16, body: &str) -> Result<ChartResult> {
    let envelope: ChartEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !(200..300).contains(&status) => {
            bail!("{symbol}: Yahoo Finance returned HTTP {status}")
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("{symbol}: unexpected Yahoo Finance response"))
        }
    };

    if let Some(err) = envelope.chart.error {
        let detail = if err.description.is_empty() {
            err.code
        } else {
            err.description
        };
        bail!("{symbol}: {detail}");
    }

    envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .with_context(|| format!("{symbol}: No data found, symbol may be delisted"))
}

#[derive(Debug, Clone, Copy, Default)]
struct Bar {
    key: i64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    adj_close: Option<f64>,
    volume: Option<f64>,
}

impl Bar {
    fn auto_adjust(&mut self) {
        let ratio = match (self.adj_close, self.close) {
            (Some(adj), Some(close)) if close != 0.0 => adj / close,
            _ => return,
        };
        self.open = self.open.map(|v| v * ratio);
        self.high = self.high.map(|v| v * ratio);
        self.low = self.low.map(|v| v * ratio);
        self.close = self.adj_close;
    }

    fn round_prices(&mut self) {
        let round = |v: Option<f64>| v.map(|x| (x * ROUND_FACTOR).round() / ROUND_FACTOR);
        self.open = round(self.open);
        self.high = round(self.high);
        self.low = round(self.low);
        self.close = round(self.close);
        self.adj_close = round(self.adj_close);
    }
}

/// Turn one chart result into a series following the request's flags.
fn build_series(symbol: &str, result: ChartResult, request: &DownloadRequest) -> Result<TickerSeries> {
    if result.timestamp.is_empty() {
        bail!("{symbol}: No data found, symbol may be delisted");
    }
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .with_context(|| format!("{symbol}: response carries no price data"))?;
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|b| b.adjclose)
        .unwrap_or_default();

    let intraday = request.interval.is_intraday();
    let offset = result.meta.gmtoffset;
    let at = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();

    let mut bars: Vec<Bar> = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let local = ts + offset;
        let key = if intraday {
            local
        } else {
            local.div_euclid(SECS_PER_DAY) * SECS_PER_DAY
        };
        let close = at(&quote.close, i);
        let bar = Bar {
            key,
            open: at(&quote.open, i),
            high: at(&quote.high, i),
            low: at(&quote.low, i),
            close,
            adj_close: at(&adjclose, i).or(close),
            volume: at(&quote.volume, i),
        };
        // Yahoo may append a live bar sharing the last bar's date
        match bars.last_mut() {
            Some(last) if last.key == key => *last = bar,
            Some(last) if last.key > key => continue,
            _ => bars.push(bar),
        }
    }

    trim_to_window(&mut bars, request);
    if bars.is_empty() {
        bail!("{symbol}: No data found for the requested dates");
    }

    for bar in &mut bars {
        if request.auto_adjust {
            bar.auto_adjust();
        }
        if request.rounding {
            bar.round_prices();
        }
    }

    let pick = |f: fn(&Bar) -> Option<f64>| bars.iter().map(f).collect::<Vec<_>>();
    let mut series = TickerSeries::new(symbol, bars.iter().map(|b| b.key).collect())
        .with_column(Field::Open, pick(|b| b.open))
        .with_column(Field::High, pick(|b| b.high))
        .with_column(Field::Low, pick(|b| b.low))
        .with_column(Field::Close, pick(|b| b.close));
    if !request.auto_adjust {
        series = series.with_column(Field::AdjClose, pick(|b| b.adj_close));
    }
    series = series.with_column(Field::Volume, pick(|b| b.volume));

    if request.actions {
        let events = result.events.unwrap_or_default();
        let slot = event_slots(&bars, offset, request);

        let mut div_col = vec![0.0; bars.len()];
        for d in events.dividends.values() {
            if let Some(i) = slot(d.date) {
                div_col[i] += d.amount;
            }
        }
        let mut split_col: Vec<Option<f64>> = vec![None; bars.len()];
        for s in events.splits.values() {
            if s.denominator == 0.0 {
                continue;
            }
            if let Some(i) = slot(s.date) {
                let ratio = s.numerator / s.denominator;
                split_col[i] = Some(split_col[i].map_or(ratio, |r| r * ratio));
            }
        }

        series = series
            .with_column(Field::Dividends, div_col.into_iter().map(Some).collect())
            .with_column(
                Field::StockSplits,
                split_col.into_iter().map(|r| Some(r.unwrap_or(0.0))).collect(),
            );
    }

    Ok(series)
}

/// Drop bars outside the requested local-day window.
///
/// Bars spanning several days stay when any part of them overlaps it.
fn trim_to_window(bars: &mut Vec<Bar>, request: &DownloadRequest) {
    let Some((from, until)) = window_days(request) else {
        return;
    };
    let days: Vec<i64> = bars.iter().map(|b| b.key.div_euclid(SECS_PER_DAY)).collect();
    let spans_days = request.interval.spans_days();
    let mut keep = days.iter().enumerate().map(|(i, &day)| {
        if spans_days {
            let next = days.get(i + 1).copied().unwrap_or(i64::MAX);
            next > from && day < until
        } else {
            (from..until).contains(&day)
        }
    });
    bars.retain(|_| keep.next().unwrap_or(false));
}

/// Maps an event timestamp to the index of the bar that carries it.
///
/// Events go to the first bar of their day. For bars spanning several days
/// that is the bar whose `[start, next start)` range holds the event day.
/// Events outside the bars or the requested window map to nothing.
fn event_slots(bars: &[Bar], offset: i64, request: &DownloadRequest) -> impl Fn(i64) -> Option<usize> {
    let days: Vec<i64> = bars.iter().map(|b| b.key.div_euclid(SECS_PER_DAY)).collect();
    let spans_days = request.interval.spans_days();
    let (from, until) = window_days(request).unwrap_or((i64::MIN, i64::MAX));

    move |ts| {
        let day = (ts + offset).div_euclid(SECS_PER_DAY);
        if !(from..until).contains(&day) {
            return None;
        }
        let bar_day = *days.get(days.partition_point(|d| *d <= day).checked_sub(1)?)?;
        if !spans_days && bar_day != day {
            return None;
        }
        Some(days.partition_point(|d| *d < bar_day))
    }
}
