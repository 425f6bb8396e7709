use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use crate::error::SourceError;
use crate::price_infra::connectors::{check_status, crypto_base, parse_json, parse_price, send, PriceAdapter};
use crate::types::ids::{AssetType, SourceId};
use crate::types::quote::PriceQuote;
use crate::types::timestamp::Timestamp;
use crate::utils::clock::Clock;

const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

pub struct CoinbaseAdapter {
    source_id: SourceId,
    client: reqwest::Client,
    base_url: String,
    base_confidence: f64,
    clock: Arc<dyn Clock>,
}

impl CoinbaseAdapter {
    pub fn new(
        source_id: SourceId,
        client: reqwest::Client,
        base_url: Option<String>,
        base_confidence: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CoinbaseAdapter {
            source_id,
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            base_confidence,
            clock,
        }
    }

    fn product_id(symbol: &str) -> String {
        format!("{}-USD", crypto_base(symbol))
    }
}

#[async_trait]
impl PriceAdapter for CoinbaseAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn asset_types(&self) -> &[AssetType] {
        &[AssetType::Crypto]
    }

    async fn fetch(&self, symbol: &str, _asset_type: AssetType) -> Result<PriceQuote, SourceError> {
        let url = format!("{}/products/{}/ticker", self.base_url, Self::product_id(symbol));
        let response = send(&self.source_id, self.client.get(url)).await?;
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
struct Ticker {
    price: String,
    time: Option<DateTime<Utc>>,
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

    let ticker: Ticker = parse_json(source_id, body)?;
    let price = parse_price(source_id, &ticker.price)?;
    let observed_at = ticker.time.map(Timestamp::from_datetime).unwrap_or(received_at);
    Ok(PriceQuote::new(source_id.clone(), price, observed_at, base_confidence))
}
