#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use stockdata_mcp::data::frame::{PriceTable, TickerSeries};
use stockdata_mcp::data::types::{DownloadRequest, Field};
use stockdata_mcp::data::Downloader;

/// 2024-01-02 as epoch seconds.
pub const JAN_2: i64 = 1_704_153_600;
pub const DAY: i64 = 86_400;

/// Daily OHLCV bars for `ticker` on the given day offsets from Jan 2 2024.
///
/// Prices rise by 1.0 per day from `base`: open = base + d, high = +1,
/// low = -1, close = +0.5.
pub fn daily_bars(ticker: &str, days: &[i64], base: f64) -> TickerSeries {
    let index: Vec<i64> = days.iter().map(|d| JAN_2 + d * DAY).collect();
    let price = |offset: f64| -> Vec<Option<f64>> {
        days.iter()
            .map(|d| Some(base + *d as f64 + offset))
            .collect()
    };
    TickerSeries::new(ticker, index)
        .with_column(Field::Open, price(0.0))
        .with_column(Field::High, price(1.0))
        .with_column(Field::Low, price(-1.0))
        .with_column(Field::Close, price(0.5))
        .with_column(Field::Volume, days.iter().map(|_| Some(1_000_000.0)).collect())
}

enum Outcome {
    Bars(Vec<TickerSeries>),
    Fail(String),
}

/// In-memory `Downloader` that records the request it was handed.
pub struct StubDownloader {
    outcome: Outcome,
    last_request: Mutex<Option<DownloadRequest>>,
}

impl StubDownloader {
    pub fn with_bars(series: Vec<TickerSeries>) -> Self {
        Self {
            outcome: Outcome::Bars(series),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Outcome::Fail(message.to_string()),
            last_request: Mutex::new(None),
        }
    }

    pub fn last_request(&self) -> Option<DownloadRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for StubDownloader {
    async fn download(&self, request: &DownloadRequest) -> Result<PriceTable> {
        *self.last_request.lock().unwrap() = Some(request.clone());
        match &self.outcome {
            Outcome::Bars(series) => {
                PriceTable::from_series(series.clone(), request.interval.is_intraday())
            }
            Outcome::Fail(message) => bail!("{message}"),
        }
    }

    fn source_name(&self) -> &str {
        "stub"
    }
}
