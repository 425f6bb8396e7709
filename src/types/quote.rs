use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::types::ids::{AssetType, SourceId};
use crate::types::timestamp::Timestamp;

/// One source's observation of a price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: f64,
    pub source: SourceId,
    pub observed_at: Timestamp,
    pub base_confidence: f64,
}

impl PriceQuote {
    pub fn new(source: SourceId, price: f64, observed_at: Timestamp, base_confidence: f64) -> Self {
        PriceQuote {
            price,
            source,
            observed_at,
            base_confidence: clamp_unit(base_confidence),
        }
    }

    /// A price that can take part in consensus math at all.
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Consensus output for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPrice {
    pub symbol: String,
    pub asset_type: AssetType,
    pub price: f64,
    /// Sources that survived outlier filtering, sorted.
    pub sources: Vec<SourceId>,
    /// Sources whose quotes were dropped as outliers, sorted.
    pub rejected: Vec<SourceId>,
    pub computed_at: Timestamp,
    pub confidence: f64,
    /// Mean relative deviation of the surviving quotes from the median.
    pub deviation: f64,
    /// Age of the oldest surviving quote at `computed_at`.
    #[serde(with = "duration_millis")]
    pub staleness: Duration,
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
