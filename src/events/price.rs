use crate::error::{Error, Result};
use crate::types::tick::PriceTick;

/// Default topic connectors publish normalised exchange ticks to.
pub const RAW_PRICES_TOPIC: &str = "raw-prices";

/// Default topic the aggregator publishes per-window batches to.
pub const AGGREGATED_PRICES_TOPIC: &str = "aggregated-prices";

/// Every bus message is one JSON array of ticks.
pub fn encode_batch(batch: &[PriceTick]) -> Result<String> {
    serde_json::to_string(batch).map_err(|e| Error::SerializationError(e.to_string()))
}

pub fn decode_batch(payload: &[u8]) -> Result<Vec<PriceTick>> {
    if payload.is_empty() {
        return Err(Error::EmptyPayload);
    }

    serde_json::from_slice(payload).map_err(|e| Error::DeserializationError(e.to_string()))
}
