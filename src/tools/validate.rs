use chrono::NaiveDate;
use garde::Validate;
use std::time::Duration;

use crate::data::types::{DownloadRequest, GroupBy, Interval, Period};
use crate::error::ToolError;
use crate::server::{DownloadStockDataParams, TickersParam};

pub const MAX_TICKERS: usize = 50;
const MAX_SYMBOL_LEN: usize = 20;
const SLOW_TICKER_COUNT: usize = 10;

/// A request that passed validation, plus non-fatal warnings.
#[derive(Debug)]
pub struct Validated {
    pub request: DownloadRequest,
    pub warnings: Vec<String>,
}

pub fn validate(params: DownloadStockDataParams) -> Result<Validated, ToolError> {
    params.validate().map_err(report_to_error)?;

    let tickers = parse_tickers(&params.tickers)?;
    let period = parse_enum::<Period>("period", params.period.as_deref())?;
    let interval = parse_enum::<Interval>("interval", params.interval.as_deref())?;
    let group_by = parse_enum::<GroupBy>("group_by", params.group_by.as_deref())?;
    let start = parse_date("start", params.start.as_deref())?;
    let end = parse_date("end", params.end.as_deref())?;

    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ToolError::invalid(
                "start",
                format!("start ({s}) must not be after end ({e})"),
            ));
        }
    }

    let mut request = DownloadRequest::new(tickers);
    request.period = period;
    request.start = start;
    request.end = end;
    if let Some(interval) = interval {
        request.interval = interval;
    }
    if let Some(group_by) = group_by {
        request.group_by = group_by;
    }
    request.actions = params.actions.unwrap_or(request.actions);
    request.auto_adjust = params.auto_adjust.unwrap_or(request.auto_adjust);
    request.prepost = params.prepost.unwrap_or(request.prepost);
    request.repair = params.repair.unwrap_or(request.repair);
    request.keepna = params.keepna.unwrap_or(request.keepna);
    request.rounding = params.rounding.unwrap_or(request.rounding);
    request.threads = params.threads.unwrap_or(request.threads);
    if let Some(secs) = params.timeout {
        request.timeout = Duration::from_secs_f64(secs);
    }

    let mut warnings = Vec::new();
    if request.tickers.len() > SLOW_TICKER_COUNT {
        warnings.push(format!(
            "Requesting {} tickers may cause timeouts. Consider smaller batches.",
            request.tickers.len()
        ));
    }
    if request.period.is_some() && request.has_date_range() {
        warnings.push(
            "Both period and start/end were specified; both are passed to the data provider."
                .to_string(),
        );
    }

    Ok(Validated { request, warnings })
}

/// First violation, named by its top-level parameter.
fn report_to_error(report: garde::Report) -> ToolError {
    match report.iter().next() {
        Some((path, error)) => {
            let path = path.to_string();
            let field = path
                .split(['.', '['])
                .find(|segment| !segment.is_empty())
                .unwrap_or("parameters");
            ToolError::invalid(field, error.to_string())
        }
        None => ToolError::invalid("parameters", report.to_string()),
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(
    field: &str,
    value: Option<&str>,
) -> Result<Option<T>, ToolError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|expected| ToolError::invalid(field, format!("got {v:?}, {expected}")))
        })
        .transpose()
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ToolError> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|_| {
                ToolError::invalid(field, format!("got {v:?}, expected a YYYY-MM-DD date"))
            })
        })
        .transpose()
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '=')
}

/// Split, upper-case and de-duplicate the ticker list, keeping first occurrence.
fn parse_tickers(param: &TickersParam) -> Result<Vec<String>, ToolError> {
    let raw: Vec<&str> = match param {
        TickersParam::One(s) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect(),
        TickersParam::Many(list) => {
            if list.iter().any(|t| t.trim().is_empty()) {
                return Err(ToolError::invalid(
                    "tickers",
                    "ticker symbols must be non-empty strings",
                ));
            }
            list.iter().map(|t| t.trim()).collect()
        }
    };

    if raw.is_empty() {
        return Err(ToolError::invalid(
            "tickers",
            "at least one ticker symbol is required",
        ));
    }

    let mut tickers: Vec<String> = Vec::with_capacity(raw.len());
    for symbol in raw {
        if symbol.len() > MAX_SYMBOL_LEN || !symbol.chars().all(is_symbol_char) {
            return Err(ToolError::invalid(
                "tickers",
                format!(
                    "invalid ticker symbol {symbol:?}; expected up to {MAX_SYMBOL_LEN} \
                     letters, digits or . - _ ^ ="
                ),
            ));
        }
        let upper = symbol.to_uppercase();
        if !tickers.contains(&upper) {
            tickers.push(upper);
        }
    }

    if tickers.len() > MAX_TICKERS {
        return Err(ToolError::invalid(
            "tickers",
            format!(
                "{} tickers requested; at most {MAX_TICKERS} are allowed",
                tickers.len()
            ),
        ));
    }

    Ok(tickers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> DownloadStockDataParams {
        serde_json::from_value(value).unwrap()
    }

    fn invalid_field(value: serde_json::Value) -> String {
        match validate(params(value)).unwrap_err() {
            ToolError::InvalidParameter { field, .. } => field,
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let v = validate(params(json!({"tickers": "aapl"}))).unwrap();
        let r = v.request;
        assert_eq!(r.tickers, vec!["AAPL"]);
        assert_eq!(r.period, None);
        assert_eq!(r.effective_period(), Period::OneYear);
        assert_eq!(r.interval, Interval::OneDay);
        assert_eq!(r.group_by, GroupBy::Column);
        assert!(r.auto_adjust && r.threads);
        assert!(!r.actions && !r.prepost && !r.repair && !r.keepna && !r.rounding);
        assert_eq!(r.timeout, Duration::from_secs(10));
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn ticker_string_splits_on_spaces_and_commas() {
        let v = validate(params(json!({"tickers": "aapl msft, GOOG,,aapl"}))).unwrap();
        assert_eq!(v.request.tickers, vec!["AAPL", "MSFT", "GOOG"]);
    }

    #[test]
    fn ticker_list_is_accepted() {
        let v = validate(params(json!({"tickers": ["BRK-B", "^GSPC", "EURUSD=X"]}))).unwrap();
        assert_eq!(v.request.tickers, vec!["BRK-B", "^GSPC", "EURUSD=X"]);
    }

    #[test]
    fn empty_tickers_are_rejected() {
        assert_eq!(invalid_field(json!({"tickers": "   "})), "tickers");
        assert_eq!(invalid_field(json!({"tickers": []})), "tickers");
        assert_eq!(invalid_field(json!({"tickers": ["AAPL", ""]})), "tickers");
    }

    #[test]
    fn bad_symbol_characters_are_rejected() {
        assert_eq!(invalid_field(json!({"tickers": "AAPL/../etc"})), "tickers");
    }

    #[test]
    fn too_many_tickers_are_rejected() {
        let many: Vec<String> = (0..=MAX_TICKERS).map(|i| format!("T{i}")).collect();
        assert_eq!(invalid_field(json!({"tickers": many})), "tickers");
    }

    #[test]
    fn enumerated_values_are_checked() {
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "period": "7d"})), "period");
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "interval": "2h"})), "interval");
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "group_by": "row"})), "group_by");
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "period": ""})), "period");
    }

    #[test]
    fn invalid_period_message_lists_choices() {
        let err = validate(params(json!({"tickers": "AAPL", "period": "7d"}))).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("period"), "{msg}");
        assert!(msg.contains("ytd"), "{msg}");
    }

    #[test]
    fn dates_must_parse() {
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "start": "2024/01/01"})), "start");
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "end": "2024-02-30"})), "end");
    }

    #[test]
    fn start_after_end_is_rejected() {
        let field = invalid_field(json!({
            "tickers": "AAPL", "start": "2024-03-01", "end": "2024-01-01"
        }));
        assert_eq!(field, "start");
    }

    #[test]
    fn timeout_out_of_range_is_rejected() {
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "timeout": 0.0})), "timeout");
        assert_eq!(invalid_field(json!({"tickers": "AAPL", "timeout": 1000.0})), "timeout");
    }

    #[test]
    fn period_and_dates_pass_through_with_warning() {
        let v = validate(params(json!({
            "tickers": "AAPL", "period": "5d", "start": "2024-01-02", "end": "2024-01-31"
        })))
        .unwrap();
        assert_eq!(v.request.period, Some(Period::FiveDays));
        assert_eq!(v.request.start, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(v.request.end, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn many_tickers_warn() {
        let tickers: Vec<String> = (0..12).map(|i| format!("T{i}")).collect();
        let v = validate(params(json!({"tickers": tickers}))).unwrap();
        assert!(v.warnings[0].contains("12 tickers"));
    }

    #[test]
    fn flags_are_forwarded() {
        let v = validate(params(json!({
            "tickers": "AAPL MSFT",
            "interval": "1wk",
            "actions": true,
            "auto_adjust": false,
            "prepost": true,
            "group_by": "ticker",
            "repair": true,
            "keepna": true,
            "rounding": true,
            "timeout": 2.5,
            "threads": false
        })))
        .unwrap();
        let r = v.request;
        assert_eq!(r.interval, Interval::OneWeek);
        assert_eq!(r.group_by, GroupBy::Ticker);
        assert!(r.actions && !r.auto_adjust && r.prepost && r.repair && r.keepna && r.rounding);
        assert!(!r.threads);
        assert_eq!(r.timeout, Duration::from_millis(2500));
    }
}
