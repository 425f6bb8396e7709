use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use crate::error::SourceError;
use crate::price_infra::connectors::{check_status, crypto_base, no_data, parse_json, parse_price, send, PriceAdapter};
use crate::types::ids::{AssetType, SourceId};
use crate::types::quote::PriceQuote;
use crate::types::timestamp::Timestamp;
use crate::utils::clock::Clock;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
// Binance error code for an unknown trading pair
const INVALID_SYMBOL: i64 = -1121;

pub struct BinanceAdapter {
    source_id: SourceId,
    client: reqwest::Client,
    base_url: String,
    base_confidence: f64,
    clock: Arc<dyn Clock>,
}

impl BinanceAdapter {
    pub fn new(
        source_id: SourceId,
        client: reqwest::Client,
        base_url: Option<String>,
        base_confidence: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        BinanceAdapter {
            source_id,
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            base_confidence,
            clock,
        }
    }

    fn pair(symbol: &str) -> String {
        format!("{}USDT", crypto_base(symbol))
    }
}

#[async_trait]
impl PriceAdapter for BinanceAdapter {
    fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn asset_types(&self) -> &[AssetType] {
        &[AssetType::Crypto]
    }

    async fn fetch(&self, symbol: &str, _asset_type: AssetType) -> Result<PriceQuote, SourceError> {
        let pair = Self::pair(symbol);
        let request = self.client
            .get(format!("{}/api/v3/ticker/price", self.base_url))
            .query(&[("symbol", pair.as_str())]);

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
struct TickerPrice {
    price: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: i64,
}

/// The ticker endpoint carries no timestamp; the quote is stamped on receipt.
fn parse_response(
    source_id: &SourceId,
    symbol: &str,
    status: u16,
    body: &str,
    received_at: Timestamp,
    base_confidence: f64,
) -> Result<PriceQuote, SourceError> {
    if status == 400 {
        if let Ok(err) = serde_json::from_str::<ApiError>(body) {
            if err.code == INVALID_SYMBOL {
                return Err(no_data(source_id, symbol));
            }
        }
    }
    check_status(source_id, symbol, status)?;

    let ticker: TickerPrice = parse_json(source_id, body)?;
    let price = parse_price(source_id, &ticker.price)?;
    Ok(PriceQuote::new(source_id.clone(), price, received_at, base_confidence))
}
