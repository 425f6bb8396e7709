use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use crate::error::SourceError;
use crate::price_infra::connectors::{check_status, forex_pair, invalid, no_data, parse_json, send, PriceAdapter};
use crate::types::ids::{AssetType, SourceId};
use crate::types::quote::PriceQuote;
use crate::types::timestamp::Timestamp;
use crate::utils::clock::Clock;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

pub struct YahooAdapter {
    source_id: SourceId,
    client: reqwest::Client,
    base_url: String,
    base_confidence: f64,
    clock: Arc<dyn Clock>,
}

impl YahooAdapter {
    pub fn new(
        source_id: SourceId,
        client: reqwest::Client,
        base_url: Option<String>,
        base_confidence: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        YahooAdapter {
            source_id,
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            base_confidence,
            clock,
        }
    }

    fn provider_symbol(symbol: &str, asset_type: AssetType) -> Option<String> {
        match asset_type {
            AssetType::Forex => forex_pair(symbol).map(|(base, quote)| format!("{}{}=X", base, quote)),
            _ => Some(symbol.trim().to_ascii_uppercase()),
        }
    }
}

#[async_trait]
impl PriceAdapter for YahooAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn asset_types(&self) -> &[AssetType] {
        &[AssetType::Equity, AssetType::Forex]
    }

    async fn fetch(&self, symbol: &str, asset_type: AssetType) -> Result<PriceQuote, SourceError> {
        let provider_symbol = Self::provider_symbol(symbol, asset_type)
            .ok_or_else(|| no_data(&self.source_id, symbol))?;

        let request = self.client
            .get(format!("{}/v8/finance/chart/{}", self.base_url, provider_symbol))
            .query(&[("interval", "1m"), ("range", "1d")]);

        let response = send(&self.source_id, request).await?;
        parse_response(
            &self.source_id,
            symbol,
            response.status,
            &response.body,
            self.clock.now(),
            self.base_confidence,
        )
    }
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

fn parse_response(
    source_id: &SourceId,
    symbol: &str,
    status: u16,
    body: &str,
    received_at: Timestamp,
    base_confidence: f64,
) -> Result<PriceQuote, SourceError> {
    check_status(source_id, symbol, status)?;

    let response: ChartResponse = parse_json(source_id, body)?;
    if let Some(error) = response.chart.error {
        if error.code == "Not Found" {
            return Err(no_data(source_id, symbol));
        }
        return Err(invalid(
            source_id,
            format!("{}: {}", error.code, error.description.unwrap_or_default()),
        ));
    }

    let meta = response.chart.result
        .and_then(|results| results.into_iter().next())
        .map(|result| result.meta)
        .ok_or_else(|| no_data(source_id, symbol))?;

    let price = meta.regular_market_price.ok_or_else(|| no_data(source_id, symbol))?;
    let observed_at = meta.regular_market_time
        .map(Timestamp::from_unix_secs)
        .unwrap_or(received_at);

    Ok(PriceQuote::new(source_id.clone(), price, observed_at, base_confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> SourceId {
        SourceId::new("yahoo")
    }

    #[test]
    fn test_provider_symbol() {
        assert_eq!(YahooAdapter::provider_symbol("msft", AssetType::Equity).as_deref(), Some("MSFT"));
        assert_eq!(YahooAdapter::provider_symbol("eurusd", AssetType::Forex).as_deref(), Some("EURUSD=X"));
    }

    #[test]
    fn test_parses_chart_meta() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"USD","symbol":"AAPL","regularMarketPrice":189.41,"regularMarketTime":1700000000},"timestamp":[],"indicators":{}}],"error":null}}"#;
        let quote = parse_response(&id(), "AAPL", 200, body, Timestamp::from_millis(0), 0.8).unwrap();
        assert_eq!(quote.price, 189.41);
        assert_eq!(quote.observed_at, Timestamp::from_millis(1_700_000_000_000));
        assert_eq!(quote.base_confidence, 0.8);
    }

    #[test]
    fn test_not_found_is_no_data() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        // Yahoo answers unknown symbols with 404 and a body; both paths agree
        for status in [200, 404] {
            let result = parse_response(&id(), "NOPE", status, body, Timestamp::from_millis(0), 1.0);
            assert!(matches!(result, Err(SourceError::NoData { .. })));
        }
    }
}
