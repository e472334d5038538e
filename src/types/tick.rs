use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Quote assets treated as pinned to one US dollar.
pub const USD_PEGS: [&str; 6] = ["TUSD", "USDT", "USDC", "USD", "DAI", "UST"];

/// Quote asset of every aggregated tick.
pub const AGGREGATE_QUOTE: &str = "USD";

pub fn is_usd_peg(symbol: &str) -> bool {
    USD_PEGS.contains(&symbol)
}

/// One priced observation of an asset, as carried on both bus topics and
/// sent to gateway clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub base: String,
    pub quote: String,
    /// Unix timestamp in milliseconds.
    pub time: u64,
    pub price: f64,
}

impl PriceTick {
    /// Builds a tick from exchange data, returning `None` when the price is
    /// not strictly positive or the quote is not a USD peg.
    pub fn normalized(base: &str, quote: &str, time: u64, price: f64) -> Option<Self> {
        if !is_valid_price(price) || !is_usd_peg(quote) || base.is_empty() {
            return None;
        }

        Some(PriceTick {
            base: base.to_string(),
            quote: quote.to_string(),
            time,
            price,
        })
    }

    pub fn aggregate(base: &str, time: u64, price: f64) -> Self {
        PriceTick {
            base: base.to_string(),
            quote: AGGREGATE_QUOTE.to_string(),
            time,
            price,
        }
    }

    pub fn is_valid(&self) -> bool {
        is_valid_price(self.price) && !self.base.is_empty()
    }
}

fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Exchanges send prices as decimal strings.
pub fn parse_price(raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| Error::InvalidPrice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalized_accepts_usd_quotes() {
        let tick = PriceTick::normalized("BTC", "USDT", 1_700_000_000_000, 30_000.5).unwrap();
        assert_eq!(tick.base, "BTC");
        assert_eq!(tick.quote, "USDT");
        assert_eq!(tick.price, 30_000.5);
    }

    #[test]
    fn test_normalized_drops_zero_and_foreign_quotes() {
        assert!(PriceTick::normalized("BTC", "USDT", 0, 0.0).is_none());
        assert!(PriceTick::normalized("ETH", "BTC", 0, 0.05).is_none());
        assert!(PriceTick::normalized("ETH", "EUR", 0, 1800.0).is_none());
        assert!(PriceTick::normalized("ETH", "USD", 0, f64::NAN).is_none());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("101.25").unwrap(), 101.25);
        assert!(matches!(parse_price("n/a"), Err(Error::InvalidPrice)));
    }

    proptest! {
        #[test]
        fn prop_non_peg_quotes_never_pass(
            quote in "[A-Z]{2,5}",
            price in 0.0001f64..1_000_000.0,
        ) {
            let tick = PriceTick::normalized("ABC", &quote, 0, price);
            prop_assert_eq!(tick.is_some(), is_usd_peg(&quote));
        }

        #[test]
        fn prop_non_positive_prices_never_pass(price in -1_000_000.0f64..=0.0) {
            prop_assert!(PriceTick::normalized("BTC", "USD", 0, price).is_none());
        }
    }
}
