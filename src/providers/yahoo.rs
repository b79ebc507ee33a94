//! Yahoo Finance chart API sources for historical closes and FX rates.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::currency::RateSource;
use crate::core::price::PriceSource;
use crate::providers::util::with_retry;

/// Days of history requested past the target date. Month starts can land on
/// weekends or holidays; a week of slack always contains a trading day.
const WINDOW_DAYS: i64 = 6;

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Vec<ChartItem>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

/// Queries the chart endpoint for `symbol` over `[date, date + WINDOW_DAYS)`
/// and returns the first non-null close at or after `date`.
///
/// `Ok(None)` covers an unknown symbol (HTTP 404) and a window with no
/// trading bars; other HTTP statuses and parse failures are errors.
async fn fetch_window_close(
    client: &reqwest::Client,
    base_url: &str,
    symbol: &str,
    date: NaiveDate,
) -> Result<Option<f64>> {
    let period1 = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    let period2 = period1 + WINDOW_DAYS * 86_400;
    let url = format!(
        "{base_url}/v8/finance/chart/{symbol}?period1={period1}&period2={period2}&interval=1d"
    );
    debug!("Requesting chart data from {}", url);

    let response = with_retry(|| async { client.get(&url).send().await }, 2, 500)
        .await
        .with_context(|| format!("Request error for symbol: {symbol} at {date}"))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        debug!("Symbol {} unknown to the chart API (404)", symbol);
        return Ok(None);
    }
    if !response.status().is_success() {
        bail!("HTTP error: {} for symbol: {} at {}", response.status(), symbol, date);
    }

    let data = response
        .json::<ChartResponse>()
        .await
        .with_context(|| format!("Failed to parse chart response for {symbol} at {date}"))?;
    let Some(item) = data.chart.result.first() else {
        return Ok(None);
    };

    let close = item
        .timestamp
        .as_ref()
        .zip(
            item.indicators
                .as_ref()
                .and_then(|inds| inds.quote.first())
                .and_then(|q| q.close.as_ref()),
        )
        .and_then(|(timestamps, closes)| {
            timestamps
                .iter()
                .zip(closes)
                .find_map(|(ts, close)| if *ts >= period1 { *close } else { None })
        });

    Ok(close)
}

pub struct YahooPriceSource {
    base_url: String,
    client: reqwest::Client,
}

impl YahooPriceSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("folio/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(YahooPriceSource {
            base_url: base_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    #[instrument(
        name = "YahooPriceFetch",
        skip(self),
        fields(ticker = %ticker, date = %date)
    )]
    async fn fetch_close(&self, ticker: &str, date: NaiveDate) -> Result<Option<f64>> {
        fetch_window_close(&self.client, &self.base_url, ticker, date).await
    }
}

pub struct YahooRateSource {
    base_url: String,
    client: reqwest::Client,
}

impl YahooRateSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("folio/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(YahooRateSource {
            base_url: base_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl RateSource for YahooRateSource {
    #[instrument(
        name = "YahooRateFetch",
        skip(self),
        fields(currency = %currency, base = %base, date = %date)
    )]
    async fn fetch_rate(&self, currency: &str, base: &str, date: NaiveDate) -> Result<Option<f64>> {
        let symbol = format!("{currency}{base}=X");
        fetch_window_close(&self.client, &self.base_url, &symbol, date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn epoch(d: NaiveDate) -> i64 {
        d.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    async fn create_mock_server(symbol: &str, response: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn chart_body(timestamps: &[i64], closes: &[Option<f64>]) -> String {
        let closes: Vec<String> = closes
            .iter()
            .map(|c| c.map_or("null".to_string(), |v| v.to_string()))
            .collect();
        format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "timestamp": [{}],
                        "indicators": {{
                            "quote": [{{
                                "close": [{}]
                            }}]
                        }}
                    }}]
                }}
            }}"#,
            timestamps.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", "),
            closes.join(", ")
        )
    }

    #[tokio::test]
    async fn test_exact_trading_day_close() {
        let target = date(2023, 11, 1);
        let body = chart_body(
            &[epoch(target), epoch(date(2023, 11, 2))],
            &[Some(170.25), Some(171.0)],
        );
        let server =
            create_mock_server("AAPL", ResponseTemplate::new(200).set_body_string(body)).await;

        let provider = YahooPriceSource::new(&server.uri()).unwrap();
        let close = provider.fetch_close("AAPL", target).await.unwrap();
        assert_eq!(close, Some(170.25));
    }

    #[tokio::test]
    async fn test_weekend_month_start_uses_next_trading_day() {
        // 2023-07-01 was a Saturday; the first bar is Monday the 3rd.
        let target = date(2023, 7, 1);
        let body = chart_body(&[epoch(date(2023, 7, 3))], &[Some(88.5)]);
        let server =
            create_mock_server("VHVE.L", ResponseTemplate::new(200).set_body_string(body)).await;

        let provider = YahooPriceSource::new(&server.uri()).unwrap();
        let close = provider.fetch_close("VHVE.L", target).await.unwrap();
        assert_eq!(close, Some(88.5));
    }

    #[tokio::test]
    async fn test_null_bars_are_skipped() {
        let target = date(2023, 11, 1);
        let body = chart_body(
            &[epoch(target), epoch(date(2023, 11, 2))],
            &[None, Some(171.0)],
        );
        let server =
            create_mock_server("AAPL", ResponseTemplate::new(200).set_body_string(body)).await;

        let provider = YahooPriceSource::new(&server.uri()).unwrap();
        let close = provider.fetch_close("AAPL", target).await.unwrap();
        assert_eq!(close, Some(171.0));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let body = r#"{"chart": {"result": []}}"#;
        let server =
            create_mock_server("DEAD", ResponseTemplate::new(200).set_body_string(body)).await;

        let provider = YahooPriceSource::new(&server.uri()).unwrap();
        let close = provider.fetch_close("DEAD", date(2023, 11, 1)).await.unwrap();
        assert_eq!(close, None);
    }

    #[tokio::test]
    async fn test_unknown_symbol_404_is_not_found() {
        let server = create_mock_server("NOPE", ResponseTemplate::new(404)).await;

        let provider = YahooPriceSource::new(&server.uri()).unwrap();
        let close = provider.fetch_close("NOPE", date(2023, 11, 1)).await.unwrap();
        assert_eq!(close, None);
    }

    #[tokio::test]
    async fn test_server_error_is_an_error() {
        let server = create_mock_server("AAPL", ResponseTemplate::new(500)).await;

        let provider = YahooPriceSource::new(&server.uri()).unwrap();
        let result = provider.fetch_close("AAPL", date(2023, 11, 1)).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("HTTP error"));
    }

    #[tokio::test]
    async fn test_malformed_response_is_an_error() {
        let body = r#"{"chart": {"results": []}}"#; // "results" instead of "result"
        let server =
            create_mock_server("AAPL", ResponseTemplate::new(200).set_body_string(body)).await;

        let provider = YahooPriceSource::new(&server.uri()).unwrap();
        let result = provider.fetch_close("AAPL", date(2023, 11, 1)).await;
        assert!(result.is_err());
        assert!(
            format!("{:#}", result.unwrap_err()).contains("Failed to parse chart response")
        );
    }

    #[tokio::test]
    async fn test_rate_fetch_composes_pair_symbol() {
        let target = date(2023, 1, 1);
        let body = chart_body(&[epoch(date(2023, 1, 2))], &[Some(1.2543)]);
        let server =
            create_mock_server("GBPUSD=X", ResponseTemplate::new(200).set_body_string(body)).await;

        let provider = YahooRateSource::new(&server.uri()).unwrap();
        let rate = provider.fetch_rate("GBP", "USD", target).await.unwrap();
        assert_eq!(rate, Some(1.2543));
    }

    #[tokio::test]
    async fn test_rate_pair_without_data_is_not_found() {
        let body = r#"{"chart": {"result": []}}"#;
        let server =
            create_mock_server("XYZUSD=X", ResponseTemplate::new(200).set_body_string(body)).await;

        let provider = YahooRateSource::new(&server.uri()).unwrap();
        let rate = provider.fetch_rate("XYZ", "USD", date(2023, 1, 1)).await.unwrap();
        assert_eq!(rate, None);
    }
}
