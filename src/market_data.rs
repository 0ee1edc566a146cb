//! Daily OHLCV retrieval.
//!
//! [`PriceSeriesProvider`] is the seam the report pipeline depends on;
//! [`YahooProvider`] implements it against the Yahoo Finance chart API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use reqwest::{Client, StatusCode};
use serde::de;
use serde::{Deserialize, Deserializer};

use crate::errors::ProviderError;
use crate::series::{Bar, PriceSeries};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const LOOKBACK_PERIOD: &str = "3mo";
pub const DAILY_INTERVAL: &str = "1d";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
// Yahoo rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    /// Returns the bars for `symbol`, or an empty series when the symbol is
    /// unknown or has no data. Only transport and payload faults are errors.
    async fn fetch(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<PriceSeries, ProviderError>;
}

// --- Payload ---

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug, Default)]
struct ChartMeta {
    #[serde(rename = "gmtoffset", default)]
    gmt_offset: i32,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

/// One column per field, index-aligned with `ChartResult::timestamp`.
#[derive(Deserialize, Debug, Default)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<LenientF64>,
    #[serde(default)]
    high: Vec<LenientF64>,
    #[serde(default)]
    low: Vec<LenientF64>,
    #[serde(default)]
    close: Vec<LenientF64>,
    #[serde(default)]
    volume: Vec<LenientF64>,
}

/// A number that may arrive as a float, an integer, a numeric string or null.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LenientF64(Option<f64>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for LenientF64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match Option::<RawNumber>::deserialize(deserializer)? {
            None => None,
            Some(RawNumber::Number(n)) => Some(n),
            Some(RawNumber::Text(text)) => match text.trim() {
                "" => None,
                digits => Some(digits.parse::<f64>().map_err(de::Error::custom)?),
            },
        };
        Ok(LenientF64(value))
    }
}

// --- Normalization ---

/// Flattens the column-per-field payload into rows.
///
/// Rows with any missing field, a non-finite price or a negative volume are
/// dropped. Timestamps are shifted by the exchange offset before taking the
/// date so a session never lands on the previous UTC day.
fn flatten_columns(
    symbol: &str,
    timestamps: &[i64],
    columns: &QuoteColumns,
    gmt_offset: i32,
) -> PriceSeries {
    let offset = FixedOffset::east_opt(gmt_offset).unwrap_or_else(|| Utc.fix());

    let rows = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let date = session_date(ts, offset)?;
            let volume = field(&columns.volume, i).filter(|v| *v >= 0.0)?;
            Some(Bar {
                date,
                open: field(&columns.open, i)?,
                high: field(&columns.high, i)?,
                low: field(&columns.low, i)?,
                close: field(&columns.close, i)?,
                volume: volume.round() as u64,
            })
        })
        .collect();

    PriceSeries::from_rows(symbol, rows)
}

fn field(column: &[LenientF64], i: usize) -> Option<f64> {
    column.get(i).and_then(|v| v.0).filter(|v| v.is_finite())
}

fn session_date(ts: i64, offset: FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|utc| utc.with_timezone(&offset).date_naive())
}

fn parse_chart(symbol: &str, body: &[u8]) -> Result<PriceSeries, ProviderError> {
    let response: ChartResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::Payload(e.to_string()))?;

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(PriceSeries::empty(symbol));
    };
    let Some(columns) = result.indicators.quote.first() else {
        return Ok(PriceSeries::empty(symbol));
    };

    Ok(flatten_columns(
        symbol,
        &result.timestamp,
        columns,
        result.meta.gmt_offset,
    ))
}

// --- Client ---

pub struct YahooProvider {
    client: Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceSeriesProvider for YahooProvider {
    async fn fetch(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<PriceSeries, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let params = [("range", period), ("interval", interval)];

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            tracing::debug!(symbol, "provider has no data for symbol");
            return Ok(PriceSeries::empty(symbol));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let series = parse_chart(symbol, &body)?;
        tracing::debug!(symbol, bars = series.len(), "fetched price series");
        Ok(series)
    }
}
