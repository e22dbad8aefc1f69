use chrono::{Datelike, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Requested time span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    TenYears,
    YearToDate,
    Max,
}

impl Period {
    pub const ALL: [Period; 11] = [
        Period::OneDay,
        Period::FiveDays,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
        Period::TwoYears,
        Period::FiveYears,
        Period::TenYears,
        Period::YearToDate,
        Period::Max,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
            Period::TenYears => "10y",
            Period::YearToDate => "ytd",
            Period::Max => "max",
        }
    }

    /// First calendar day of this period when it ends on `end`.
    pub fn start_before(self, end: NaiveDate) -> NaiveDate {
        let months_back = |n: u32| end.checked_sub_months(Months::new(n)).unwrap_or(end);
        match self {
            Period::OneDay => end - chrono::Duration::days(1),
            Period::FiveDays => end - chrono::Duration::days(5),
            Period::OneMonth => months_back(1),
            Period::ThreeMonths => months_back(3),
            Period::SixMonths => months_back(6),
            Period::OneYear => months_back(12),
            Period::TwoYears => months_back(24),
            Period::FiveYears => months_back(60),
            Period::TenYears => months_back(120),
            Period::YearToDate => NaiveDate::from_ymd_opt(end.year(), 1, 1).unwrap_or(end),
            Period::Max => NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(end),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("expected one of {}", join_names(Period::ALL.map(Period::as_str))))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    OneHour,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::SixtyMinutes,
        Interval::NinetyMinutes,
        Interval::OneHour,
        Interval::OneDay,
        Interval::FiveDays,
        Interval::OneWeek,
        Interval::OneMonth,
        Interval::ThreeMonths,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::SixtyMinutes => "60m",
            Interval::NinetyMinutes => "90m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::FiveDays => "5d",
            Interval::OneWeek => "1wk",
            Interval::OneMonth => "1mo",
            Interval::ThreeMonths => "3mo",
        }
    }

    /// Bars covering more than one trading day.
    pub fn spans_days(self) -> bool {
        matches!(
            self,
            Interval::FiveDays | Interval::OneWeek | Interval::OneMonth | Interval::ThreeMonths
        )
    }

    /// Bars shorter than one trading day carry a time of day.
    pub fn is_intraday(self) -> bool {
        matches!(
            self,
            Interval::OneMinute
                | Interval::TwoMinutes
                | Interval::FiveMinutes
                | Interval::FifteenMinutes
                | Interval::ThirtyMinutes
                | Interval::SixtyMinutes
                | Interval::NinetyMinutes
                | Interval::OneHour
        )
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| {
                format!("expected one of {}", join_names(Interval::ALL.map(Interval::as_str)))
            })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nesting order of multi-ticker output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupBy {
    #[default]
    Column,
    Ticker,
}

impl GroupBy {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Column => "column",
            GroupBy::Ticker => "ticker",
        }
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "column" => Ok(GroupBy::Column),
            "ticker" => Ok(GroupBy::Ticker),
            _ => Err("expected one of column, ticker".to_string()),
        }
    }
}

/// A value column of a price bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
    Dividends,
    StockSplits,
}

impl Field {
    /// Canonical column order.
    pub const ORDER: [Field; 8] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::AdjClose,
        Field::Volume,
        Field::Dividends,
        Field::StockSplits,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::AdjClose => "adj_close",
            Field::Volume => "volume",
            Field::Dividends => "dividends",
            Field::StockSplits => "stock_splits",
        }
    }

    /// Corporate-action columns are zero-filled, so they never count as missing data.
    pub fn is_action(self) -> bool {
        matches!(self, Field::Dividends | Field::StockSplits)
    }
}

/// Validated parameter set for one `download_stock_data` call.
///
/// `period` and `start`/`end` are carried as supplied; the provider decides
/// which wins when both are present.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub tickers: Vec<String>,
    pub period: Option<Period>,
    pub interval: Interval,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub actions: bool,
    pub auto_adjust: bool,
    pub prepost: bool,
    pub group_by: GroupBy,
    pub repair: bool,
    pub keepna: bool,
    pub rounding: bool,
    pub timeout: Duration,
    pub threads: bool,
}

impl DownloadRequest {
    pub const DEFAULT_PERIOD: Period = Period::OneYear;
    pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

    /// Request for `tickers` with every flag at its default.
    pub fn new(tickers: Vec<String>) -> Self {
        Self {
            tickers,
            period: None,
            interval: Interval::OneDay,
            start: None,
            end: None,
            actions: false,
            auto_adjust: true,
            prepost: false,
            group_by: GroupBy::Column,
            repair: false,
            keepna: false,
            rounding: false,
            timeout: Duration::from_secs_f64(Self::DEFAULT_TIMEOUT_SECS),
            threads: true,
        }
    }

    pub fn effective_period(&self) -> Period {
        self.period.unwrap_or(Self::DEFAULT_PERIOD)
    }

    pub fn has_date_range(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Human-readable span: the period, or `start to end` for explicit dates.
    pub fn span_label(&self) -> String {
        if self.has_date_range() {
            let fmt = |d: Option<NaiveDate>| {
                d.map_or_else(|| "N/A".to_string(), |d| d.format("%Y-%m-%d").to_string())
            };
            format!("{} to {}", fmt(self.start), fmt(self.end))
        } else {
            self.effective_period().to_string()
        }
    }
}

fn join_names<const N: usize>(names: [&str; N]) -> String {
    names.join(", ")
}
