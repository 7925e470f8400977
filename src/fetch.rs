use crate::config::FetchConfig;
use crate::prices::{PriceTable, SymbolSeries};
use anyhow::{Result, bail};
use chrono::DateTime;
use futures::future::join_all;
use log::warn;
use reqwest::Client;
use serde::Deserialize;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
// Yahoo rejects requests with no User-Agent.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; market-lab/0.1)";

// --- Chart API response shapes ---

#[derive(Deserialize, Debug)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    // Yahoo fills non-trading slots with JSON null.
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn series_from_chart(symbol: &str, envelope: ChartEnvelope) -> Result<SymbolSeries> {
    if let Some(err) = envelope.chart.error {
        bail!("{}: {} ({})", symbol, err.description, err.code);
    }
    let result = envelope
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| anyhow::anyhow!("{}: chart response has no result", symbol))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let points = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            DateTime::from_timestamp(ts, 0).map(|dt| (dt.date_naive(), close))
        })
        .collect();

    Ok(SymbolSeries {
        symbol: symbol.to_string(),
        points,
    })
}

/// One symbol's daily closes. Failures are logged and reported as `None`
/// so one bad ticker doesn't sink the whole batch.
async fn fetch_series(client: &Client, symbol: &str, fetch: &FetchConfig) -> Option<SymbolSeries> {
    let url = format!("{}/{}", CHART_URL, symbol);
    let query = [
        ("range", fetch.range.as_str()),
        ("interval", fetch.interval.as_str()),
    ];

    let response = match client.get(&url).query(&query).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("{}: request failed: {}", symbol, e);
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!("{}: chart API returned {}", symbol, status);
        return None;
    }

    let envelope: ChartEnvelope = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            warn!("{}: could not parse chart response: {}", symbol, e);
            return None;
        }
    };

    match series_from_chart(symbol, envelope) {
        Ok(series) => Some(series),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

/// Fetches every symbol concurrently, aligns the series on a shared date
/// axis, and forward-fills weekend/holiday gaps so every symbol has a
/// valid previous close before the analyzer runs.
pub async fn fetch_price_table(symbols: &[String], fetch: &FetchConfig) -> Result<PriceTable> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(50)
        .build()?;

    let tasks: Vec<_> = symbols
        .iter()
        .map(|s| fetch_series(&client, s, fetch))
        .collect();
    let results = join_all(tasks).await;
    let series: Vec<SymbolSeries> = results.into_iter().flatten().collect();

    if series.is_empty() {
        bail!("no price data could be fetched for any configured symbol");
    }

    let mut table = PriceTable::from_series(series);
    table.forward_fill();
    Ok(table)
}
