use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use crate::error::SourceError;
use crate::price_infra::connectors::{check_status, crypto_base, invalid, no_data, parse_json, parse_price, send, PriceAdapter};
use crate::types::ids::{AssetType, SourceId};
use crate::types::quote::PriceQuote;
use crate::types::timestamp::Timestamp;
use crate::utils::clock::Clock;

const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenAdapter {
    source_id: SourceId,
    client: reqwest::Client,
    base_url: String,
    base_confidence: f64,
    clock: Arc<dyn Clock>,
}

impl KrakenAdapter {
    pub fn new(
        source_id: SourceId,
        client: reqwest::Client,
        base_url: Option<String>,
        base_confidence: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        KrakenAdapter {
            source_id,
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            base_confidence,
            clock,
        }
    }

    /// Kraken still calls bitcoin XBT.
    fn pair(symbol: &str) -> String {
        match crypto_base(symbol).as_str() {
            "BTC" => "XBTUSD".to_string(),
            base => format!("{}USD", base),
        }
    }
}

#[async_trait]
impl PriceAdapter for KrakenAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn asset_types(&self) -> &[AssetType] {
        &[AssetType::Crypto]
    }

    async fn fetch(&self, symbol: &str, _asset_type: AssetType) -> Result<PriceQuote, SourceError> {
        let pair = Self::pair(symbol);
        let request = self.client
            .get(format!("{}/0/public/Ticker", self.base_url))
            .query(&[("pair", pair.as_str())]);

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
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, TickerInfo>,
}

#[derive(Deserialize)]
struct TickerInfo {
    /// Last trade: [price, lot volume]
    c: Vec<String>,
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

    // Kraken reports failures with HTTP 200 and a populated error list
    let response: TickerResponse = parse_json(source_id, body)?;
    if let Some(error) = response.error.first() {
        if error.starts_with("EQuery:Unknown asset pair") {
            return Err(no_data(source_id, symbol));
        }
        return Err(invalid(source_id, error.clone()));
    }

    // The result is keyed by Kraken's internal pair name (XXBTZUSD), so take the only entry
    let ticker = response.result
        .into_values()
        .next()
        .ok_or_else(|| no_data(source_id, symbol))?;
    let last = ticker.c
        .first()
        .ok_or_else(|| invalid(source_id, "ticker without last trade"))?;

    let price = parse_price(source_id, last)?;
    Ok(PriceQuote::new(source_id.clone(), price, received_at, base_confidence))
}
