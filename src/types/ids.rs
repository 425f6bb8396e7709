use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of an upstream price source, e.g. `binance`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        SourceId(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        SourceId::new(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Crypto,
    Equity,
    Forex,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Crypto => "crypto",
            AssetType::Equity => "equity",
            AssetType::Forex => "forex",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crypto" => Ok(AssetType::Crypto),
            "equity" | "stock" => Ok(AssetType::Equity),
            "forex" | "fx" => Ok(AssetType::Forex),
            other => Err(format!("unknown asset type: {}", other)),
        }
    }
}

/// Cache key: one consensus per (symbol, asset type).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub symbol: String,
    pub asset_type: AssetType,
}

impl PriceKey {
    pub fn new(symbol: &str, asset_type: AssetType) -> Self {
        PriceKey {
            symbol: normalize_symbol(symbol),
            asset_type,
        }
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.asset_type)
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
