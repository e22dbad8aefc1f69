//! Aligned price table returned by a [`Downloader`](super::Downloader).
//!
//! Each ticker arrives as a [`TickerSeries`]; the table joins them on the
//! bar timestamp so every row holds one point in time across all tickers.

use anyhow::{bail, Context, Result};
use polars::prelude::*;

use super::types::Field;

/// Index column: bar time as exchange-local epoch seconds.
pub const TIMESTAMP_COL: &str = "timestamp";

/// One value column of the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    pub ticker: String,
    pub field: Field,
}

impl ColumnKey {
    pub fn new(ticker: impl Into<String>, field: Field) -> Self {
        Self {
            ticker: ticker.into(),
            field,
        }
    }

    fn frame_name(&self) -> String {
        format!("{}:{}", self.field.name(), self.ticker)
    }
}

/// Bars for a single ticker, one entry per timestamp.
#[derive(Debug, Clone, Default)]
pub struct TickerSeries {
    pub ticker: String,
    /// Exchange-local epoch seconds, ascending and unique.
    pub index: Vec<i64>,
    pub columns: Vec<(Field, Vec<Option<f64>>)>,
}

impl TickerSeries {
    pub fn new(ticker: impl Into<String>, index: Vec<i64>) -> Self {
        Self {
            ticker: ticker.into(),
            index,
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_column(mut self, field: Field, values: Vec<Option<f64>>) -> Self {
        self.columns.push((field, values));
        self
    }

    fn into_frame(self) -> Result<DataFrame> {
        let mut df = df! { TIMESTAMP_COL => &self.index }?;
        for (field, values) in self.columns {
            if values.len() != self.index.len() {
                bail!(
                    "{} column for {} has {} values but the index has {}",
                    field.name(),
                    self.ticker,
                    values.len(),
                    self.index.len()
                );
            }
            let name = ColumnKey::new(self.ticker.as_str(), field).frame_name();
            df.with_column(Column::new(PlSmallStr::from(name.as_str()), values))?;
        }
        Ok(df)
    }
}

/// Descriptive statistics of one column, ignoring missing values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub first: Option<f64>,
    pub last: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PriceTable {
    df: DataFrame,
    tickers: Vec<String>,
    columns: Vec<ColumnKey>,
    intraday: bool,
}

impl PriceTable {
    /// Full outer join of every series on [`TIMESTAMP_COL`], sorted ascending.
    ///
    /// A ticker without a bar at some timestamp gets nulls in that row.
    pub fn from_series(series: Vec<TickerSeries>, intraday: bool) -> Result<Self> {
        if series.is_empty() {
            bail!("No ticker data to build a price table from");
        }

        let tickers: Vec<String> = series.iter().map(|s| s.ticker.clone()).collect();
        let columns: Vec<ColumnKey> = series
            .iter()
            .flat_map(|s| {
                s.columns
                    .iter()
                    .map(|(field, _)| ColumnKey::new(s.ticker.as_str(), *field))
            })
            .collect();

        let mut frames = series.into_iter().map(TickerSeries::into_frame);
        let first = frames
            .next()
            .context("No ticker data to build a price table from")??;

        let mut joined = first.lazy();
        for frame in frames {
            joined = joined.join(
                frame?.lazy(),
                [col(TIMESTAMP_COL)],
                [col(TIMESTAMP_COL)],
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
            );
        }

        let df = joined
            .sort([TIMESTAMP_COL], SortMultipleOptions::default())
            .collect()
            .context("Failed to align ticker series")?;

        Ok(Self {
            df,
            tickers,
            columns,
            intraday,
        })
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn is_intraday(&self) -> bool {
        self.intraday
    }

    /// Fields present for `ticker`, in table order.
    pub fn fields_for(&self, ticker: &str) -> Vec<Field> {
        self.columns
            .iter()
            .filter(|k| k.ticker == ticker)
            .map(|k| k.field)
            .collect()
    }

    /// Union of fields across tickers, in canonical order.
    pub fn fields(&self) -> Vec<Field> {
        Field::ORDER
            .into_iter()
            .filter(|f| self.columns.iter().any(|k| k.field == *f))
            .collect()
    }

    pub fn index(&self) -> Result<Vec<i64>> {
        let ca = self.df.column(TIMESTAMP_COL)?.i64()?;
        Ok(ca.into_iter().map(Option::unwrap_or_default).collect())
    }

    pub fn values(&self, key: &ColumnKey) -> Result<Vec<Option<f64>>> {
        let name = key.frame_name();
        let ca = self
            .df
            .column(name.as_str())
            .with_context(|| format!("Missing column {name}"))?
            .f64()?;
        Ok(ca.into_iter().collect())
    }

    /// Drop rows where every price and volume column is missing.
    pub fn drop_empty_rows(self) -> Result<Self> {
        let Some(any_present) = self
            .columns
            .iter()
            .filter(|k| !k.field.is_action())
            .map(|k| col(k.frame_name().as_str()).is_not_null())
            .reduce(|acc, e| acc.or(e))
        else {
            return Ok(self);
        };

        let df = self
            .df
            .lazy()
            .filter(any_present)
            .collect()
            .context("Failed to drop empty rows")?;

        Ok(Self { df, ..self })
    }

    pub fn stats(&self, key: &ColumnKey) -> Result<ColumnStats> {
        let name = key.frame_name();
        let c = || col(name.as_str());
        let out = self
            .df
            .clone()
            .lazy()
            .select([
                c().count().cast(DataType::UInt64).alias("count"),
                c().min().alias("min"),
                c().max().alias("max"),
                c().mean().alias("mean"),
                c().drop_nulls().first().alias("first"),
                c().drop_nulls().last().alias("last"),
            ])
            .collect()
            .with_context(|| format!("Failed to summarise {name}"))?;

        let f = |col_name: &str| -> Result<Option<f64>> {
            Ok(out.column(col_name)?.f64()?.get(0))
        };

        Ok(ColumnStats {
            count: out.column("count")?.u64()?.get(0).unwrap_or(0) as usize,
            min: f("min")?,
            max: f("max")?,
            mean: f("mean")?,
            first: f("first")?,
            last: f("last")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    fn series(ticker: &str, days: &[i64], closes: &[Option<f64>]) -> TickerSeries {
        TickerSeries::new(ticker, days.iter().map(|d| d * DAY).collect())
            .with_column(Field::Close, closes.to_vec())
            .with_column(Field::Volume, closes.iter().map(|c| c.map(|_| 1000.0)).collect())
    }

    #[test]
    fn single_series_keeps_order_and_values() {
        let s = series("AAPL", &[1, 2, 3], &[Some(1.0), Some(2.0), Some(3.0)]);
        let table = PriceTable::from_series(vec![s], false).unwrap();
        assert_eq!(table.height(), 3);
        assert_eq!(table.index().unwrap(), vec![DAY, 2 * DAY, 3 * DAY]);
        let close = table.values(&ColumnKey::new("AAPL", Field::Close)).unwrap();
        assert_eq!(close, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(table.fields_for("AAPL"), vec![Field::Close, Field::Volume]);
    }

    #[test]
    fn tickers_align_on_union_of_timestamps() {
        let table = PriceTable::from_series(
            vec![
                series("AAPL", &[1, 2, 4], &[Some(10.0), Some(11.0), Some(12.0)]),
                series("MSFT", &[2, 3, 4], &[Some(20.0), Some(21.0), Some(22.0)]),
            ],
            false,
        )
        .unwrap();

        assert_eq!(table.height(), 4);
        assert_eq!(table.index().unwrap(), vec![DAY, 2 * DAY, 3 * DAY, 4 * DAY]);
        assert_eq!(
            table.values(&ColumnKey::new("AAPL", Field::Close)).unwrap(),
            vec![Some(10.0), Some(11.0), None, Some(12.0)]
        );
        assert_eq!(
            table.values(&ColumnKey::new("MSFT", Field::Close)).unwrap(),
            vec![None, Some(20.0), Some(21.0), Some(22.0)]
        );
        assert_eq!(table.tickers(), ["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn drop_empty_rows_ignores_action_columns() {
        let s = series("AAPL", &[1, 2, 3], &[Some(1.0), None, Some(3.0)])
            .with_column(Field::Dividends, vec![Some(0.0), Some(0.0), Some(0.0)]);
        let table = PriceTable::from_series(vec![s], false).unwrap();
        assert_eq!(table.height(), 3);

        let dropped = table.drop_empty_rows().unwrap();
        assert_eq!(dropped.height(), 2);
        assert_eq!(dropped.index().unwrap(), vec![DAY, 3 * DAY]);
    }

    #[test]
    fn drop_empty_rows_keeps_partially_filled_rows() {
        let table = PriceTable::from_series(
            vec![
                series("AAPL", &[1, 2], &[Some(1.0), None]),
                series("MSFT", &[1, 2], &[None, Some(2.0)]),
            ],
            false,
        )
        .unwrap();
        assert_eq!(table.drop_empty_rows().unwrap().height(), 2);
    }

    #[test]
    fn stats_skip_missing_values() {
        let table = PriceTable::from_series(
            vec![series("AAPL", &[1, 2, 3, 4], &[Some(2.0), None, Some(6.0), Some(4.0)])],
            false,
        )
        .unwrap();
        let stats = table.stats(&ColumnKey::new("AAPL", Field::Close)).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, Some(2.0));
        assert_eq!(stats.max, Some(6.0));
        assert_eq!(stats.mean, Some(4.0));
        assert_eq!(stats.first, Some(2.0));
        assert_eq!(stats.last, Some(4.0));
    }

    #[test]
    fn mismatched_column_length_is_rejected() {
        let s = TickerSeries::new("AAPL", vec![DAY, 2 * DAY])
            .with_column(Field::Close, vec![Some(1.0)]);
        let err = PriceTable::from_series(vec![s], false).unwrap_err();
        assert!(err.to_string().contains("close column for AAPL"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(PriceTable::from_series(vec![], false).is_err());
    }
}
