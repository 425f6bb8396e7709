pub mod binance;
pub mod coinbase;
pub mod finnhub;
pub mod kraken;
pub mod yahoo;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::config::sources::{SourceConfig, SourceKind};
use crate::error::{Error, Result, SourceError};
use crate::types::ids::{AssetType, SourceId};
use crate::types::quote::PriceQuote;
use crate::utils::clock::Clock;

/// One upstream price provider.
///
/// Implementations bound their own call time (HTTP client timeout) and never
/// retry; retry policy belongs to the circuit breaker and the caller.
#[async_trait]
pub trait PriceAdapter: Send + Sync {
    fn source_id(&self) -> &SourceId;
    fn asset_types(&self) -> &[AssetType];
    async fn fetch(
        &self,
        symbol: &str,
        asset_type: AssetType,
    ) -> std::result::Result<PriceQuote, SourceError>;

    fn supports(&self, asset_type: AssetType) -> bool {
        self.asset_types().contains(&asset_type)
    }
}

pub fn build_adapter(config: &SourceConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn PriceAdapter>> {
    let client = http_client(config.http_timeout())?;
    let source_id = config.source_id();
    let confidence = config.base_confidence();
    let base_url = config.base_url.clone();

    let adapter: Arc<dyn PriceAdapter> = match config.kind {
        SourceKind::Binance => Arc::new(binance::BinanceAdapter::new(source_id, client, base_url, confidence, clock)),
        SourceKind::Coinbase => Arc::new(coinbase::CoinbaseAdapter::new(source_id, client, base_url, confidence, clock)),
        SourceKind::Kraken => Arc::new(kraken::KrakenAdapter::new(source_id, client, base_url, confidence, clock)),
        SourceKind::Yahoo => Arc::new(yahoo::YahooAdapter::new(source_id, client, base_url, confidence, clock)),
        SourceKind::Finnhub => {
            let api_key = config.api_key.clone()
                .ok_or_else(|| Error::ConfigError(format!("source {} requires api_key", source_id)))?;
            Arc::new(finnhub::FinnhubAdapter::new(source_id, client, base_url, api_key, confidence, clock))
        }
    };
    Ok(adapter)
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("price_oracle/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::ConfigError(format!("HTTP client: {}", e)))
}

pub(crate) struct HttpResponse {
    pub status: u16,
    pub body: String,
}

pub(crate) async fn send(
    source_id: &SourceId,
    request: reqwest::RequestBuilder,
) -> std::result::Result<HttpResponse, SourceError> {
    let response = request.send().await.map_err(|e| transport_error(source_id, e))?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| transport_error(source_id, e))?;
    Ok(HttpResponse { status, body })
}

fn transport_error(source_id: &SourceId, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout { source_id: source_id.clone() }
    } else {
        SourceError::Network {
            source_id: source_id.clone(),
            message: e.to_string(),
        }
    }
}

/// 2xx passes, 404 means the provider does not know the symbol.
pub(crate) fn check_status(
    source_id: &SourceId,
    symbol: &str,
    status: u16,
) -> std::result::Result<(), SourceError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(no_data(source_id, symbol)),
        status => Err(SourceError::HttpStatus { source_id: source_id.clone(), status }),
    }
}

pub(crate) fn no_data(source_id: &SourceId, symbol: &str) -> SourceError {
    SourceError::NoData {
        source_id: source_id.clone(),
        symbol: symbol.to_string(),
    }
}

pub(crate) fn invalid(source_id: &SourceId, message: impl Into<String>) -> SourceError {
    SourceError::InvalidResponse {
        source_id: source_id.clone(),
        message: message.into(),
    }
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    source_id: &SourceId,
    body: &str,
) -> std::result::Result<T, SourceError> {
    serde_json::from_str(body).map_err(|e| invalid(source_id, e.to_string()))
}

pub(crate) fn parse_price(source_id: &SourceId, raw: &str) -> std::result::Result<f64, SourceError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| invalid(source_id, format!("unparseable price {:?}", raw)))
}

/// `BTC`, `btc-usd`, `BTC/USDT` and `BTCUSDT` all become `BTC`.
pub(crate) fn crypto_base(symbol: &str) -> String {
    let symbol = symbol.trim().to_ascii_uppercase();
    let base = symbol.split(['-', '/']).next().unwrap_or(symbol.as_str());
    for quote in ["USDT", "USD"] {
        if let Some(stripped) = base.strip_suffix(quote) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    base.to_string()
}

/// `EURUSD`, `eur/usd` and `EUR-USD` become `("EUR", "USD")`.
pub(crate) fn forex_pair(symbol: &str) -> Option<(String, String)> {
    let cleaned: String = symbol
        .trim()
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    if cleaned.len() != 6 {
        return None;
    }
    Some((cleaned[..3].to_string(), cleaned[3..].to_string()))
}
