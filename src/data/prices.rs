use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use serde_json::Value;

use crate::error::ExtractPricesError;

/// Wide-format price panel: one row per date, one column per symbol.
///
/// Cells hold the adjusted close for that (date, symbol) pair, or `None`
/// where the provider returned no value. The panel is transient: it is
/// produced by the price fetcher and consumed immediately by the reshaper.
#[derive(Debug, Clone)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    // closes[date_idx][symbol_idx]
    closes: Vec<Vec<Option<f64>>>,
}

impl PricePanel {
    /// Builds a panel from per-symbol close series.
    ///
    /// The date axis is the sorted union of all series dates; symbols keep
    /// the order they are given in. A symbol with no observation on some
    /// date gets a missing cell there.
    pub fn from_series(series: Vec<(String, Vec<(NaiveDate, f64)>)>) -> Self {
        let mut dates: Vec<NaiveDate> = series
            .iter()
            .flat_map(|(_, points)| points.iter().map(|(date, _)| *date))
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let symbols: Vec<String> = series.iter().map(|(symbol, _)| symbol.clone()).collect();

        let by_symbol: Vec<HashMap<NaiveDate, f64>> = series
            .into_iter()
            .map(|(_, points)| points.into_iter().collect())
            .collect();

        let closes = dates
            .iter()
            .map(|date| by_symbol.iter().map(|map| map.get(date).copied()).collect())
            .collect();

        Self {
            dates,
            symbols,
            closes,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Close value at (date index, symbol index), `None` when missing.
    pub fn close(&self, date_idx: usize, symbol_idx: usize) -> Option<f64> {
        self.closes
            .get(date_idx)
            .and_then(|row| row.get(symbol_idx))
            .copied()
            .flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.symbols.is_empty()
    }
}

/// A source of historical close prices for a set of symbols.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetches the full panel for `symbols` over the inclusive window
    /// `[start, end]` in one batched call. All-or-nothing: no partial
    /// panel is ever returned.
    async fn fetch_prices(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, ExtractPricesError>;
}

const DEFAULT_SPARK_URL: &str = "https://query1.finance.yahoo.com/v8/finance/spark";

/// Price source backed by the Yahoo Finance spark endpoint.
///
/// The spark endpoint accepts a comma-joined symbol list, so the whole
/// panel comes back from a single request, with no per-symbol chunking or
/// per-symbol retry.
pub struct SparkApiSource {
    base_url: String,
    client: reqwest::Client,
}

impl SparkApiSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            base_url: DEFAULT_SPARK_URL.to_string(),
            client,
        }
    }

    /// Overrides the endpoint, for pointing at a local stand-in.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl PriceSource for SparkApiSource {
    async fn fetch_prices(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PricePanel, ExtractPricesError> {
        if symbols.is_empty() {
            return Err(ExtractPricesError::EmptySymbolSet);
        }
        if start > end {
            return Err(ExtractPricesError::InvalidDateRange { start, end });
        }

        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive; push it one day past `end` so the end date
        // itself is covered.
        let period2 = (end + Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let payload = self
            .client
            .get(&self.base_url)
            .query(&[
                ("symbols", symbols.join(",")),
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        parse_spark_payload(&payload, symbols, start, end)
    }
}

/// Parses a spark response into a panel covering exactly `symbols`.
///
/// Symbol columns keep the requested order regardless of response order;
/// symbols absent from the response become all-missing columns. Timestamps
/// outside `[start, end]` are discarded. A `null` in the close series is a
/// missing cell, not an error.
pub fn parse_spark_payload(
    payload: &Value,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PricePanel, ExtractPricesError> {
    if let Some(error) = payload.get("spark").and_then(|s| s.get("error")) {
        if !error.is_null() {
            return Err(ExtractPricesError::Provider(error.to_string()));
        }
    }

    let results = payload
        .get("spark")
        .and_then(|s| s.get("result"))
        .and_then(Value::as_array)
        .ok_or(ExtractPricesError::UnexpectedShape("spark.result missing"))?;

    let mut by_symbol: HashMap<String, Vec<(NaiveDate, f64)>> = HashMap::new();

    for entry in results {
        let symbol = entry
            .get("symbol")
            .and_then(Value::as_str)
            .ok_or(ExtractPricesError::UnexpectedShape(
                "result entry without symbol",
            ))?;

        let response = entry
            .get("response")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .ok_or(ExtractPricesError::UnexpectedShape(
                "result entry without response block",
            ))?;

        // A symbol with no observations in the window comes back without a
        // timestamp array; that is an empty series, not a shape error.
        let timestamps = response
            .get("timestamp")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // Prefer the adjusted series, fall back to the raw close.
        let closes = adjclose_series(response)
            .or_else(|| quote_close_series(response))
            .ok_or(ExtractPricesError::UnexpectedShape("close series missing"))?;

        let mut points = Vec::new();
        for (ts, close) in timestamps.iter().zip(closes.iter()) {
            let Some(seconds) = ts.as_i64() else {
                continue;
            };
            let Some(date) = DateTime::from_timestamp(seconds, 0).map(|dt| dt.date_naive())
            else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            if let Some(close) = close.as_f64() {
                points.push((date, close));
            }
        }

        by_symbol.insert(symbol.to_string(), points);
    }

    let series = symbols
        .iter()
        .map(|symbol| {
            (
                symbol.clone(),
                by_symbol.remove(symbol).unwrap_or_default(),
            )
        })
        .collect();

    let panel = PricePanel::from_series(series);
    if panel.is_empty() {
        return Err(ExtractPricesError::Empty);
    }

    Ok(panel)
}

fn adjclose_series(response: &Value) -> Option<&Vec<Value>> {
    response
        .get("indicators")
        .and_then(|i| i.get("adjclose"))
        .and_then(|a| a.get(0))
        .and_then(|a| a.get("adjclose"))
        .and_then(Value::as_array)
}

fn quote_close_series(response: &Value) -> Option<&Vec<Value>> {
    response
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.get(0))
        .and_then(|q| q.get("close"))
        .and_then(Value::as_array)
}
