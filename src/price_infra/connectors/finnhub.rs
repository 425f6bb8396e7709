use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use crate::error::SourceError;
use crate::price_infra::connectors::{check_status, forex_pair, no_data, parse_json, send, PriceAdapter};
use crate::types::ids::{AssetType, SourceId};
use crate::types::quote::PriceQuote;
use crate::types::timestamp::Timestamp;
use crate::utils::clock::Clock;

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Finnhub `/quote` for equities and forex. Forex pairs go through the
/// OANDA feed (`OANDA:EUR_USD`).
pub struct FinnhubAdapter {
    source_id: SourceId,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    base_confidence: f64,
    clock: Arc<dyn Clock>,
}

impl FinnhubAdapter {
    pub fn new(
        source_id: SourceId,
        client: reqwest::Client,
        base_url: Option<String>,
        api_key: String,
        base_confidence: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        FinnhubAdapter {
            source_id,
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            base_confidence,
            clock,
        }
    }

    fn provider_symbol(symbol: &str, asset_type: AssetType) -> Option<String> {
        match asset_type {
            AssetType::Forex => forex_pair(symbol).map(|(base, quote)| format!("OANDA:{}_{}", base, quote)),
            _ => Some(symbol.trim().to_ascii_uppercase()),
        }
    }
}

#[async_trait]
impl PriceAdapter for FinnhubAdapter {
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
            .get(format!("{}/quote", self.base_url))
            .header("X-Finnhub-Token", &self.api_key)
            .query(&[("symbol", provider_symbol.as_str())]);

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
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Unix seconds of the last update
    t: Option<i64>,
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

    // Unknown symbols come back as an all-zero quote
    let quote: QuoteResponse = parse_json(source_id, body)?;
    let price = match quote.c {
        Some(price) if price > 0.0 => price,
        _ => return Err(no_data(source_id, symbol)),
    };
    let observed_at = quote.t
        .filter(|t| *t > 0)
        .map(Timestamp::from_unix_secs)
        .unwrap_or(received_at);

    Ok(PriceQuote::new(source_id.clone(), price, observed_at, base_confidence))
}
