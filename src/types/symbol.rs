use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use crate::error::{Error, Result};

/// Decomposition of one exchange-native market symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub ticker: String,
    pub base_asset: String,
    pub quote_asset: String,
}

/// Immutable ticker → symbol lookup for a single exchange.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    by_ticker: HashMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn new(symbols: impl IntoIterator<Item = SymbolInfo>) -> Self {
        SymbolTable {
            by_ticker: symbols
                .into_iter()
                .map(|info| (info.ticker.clone(), info))
                .collect(),
        }
    }

    pub fn resolve(&self, ticker: &str) -> Result<&SymbolInfo> {
        self.by_ticker
            .get(ticker)
            .ok_or_else(|| Error::UnknownSymbol(ticker.to_string()))
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.by_ticker.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }
}

/// Holds the current table of one connector. Refreshes swap in a whole new
/// table; readers keep whatever snapshot they already hold.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    current: RwLock<Arc<SymbolTable>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<SymbolTable> {
        self.current.read().clone()
    }

    pub fn replace(&self, table: SymbolTable) {
        *self.current.write() = Arc::new(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(ticker: &str, base: &str, quote: &str) -> SymbolInfo {
        SymbolInfo {
            ticker: ticker.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
        }
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let table = SymbolTable::new(vec![info("BTCUSDT", "BTC", "USDT")]);
        assert_eq!(table.resolve("BTCUSDT").unwrap().base_asset, "BTC");
        assert!(matches!(table.resolve("ETHUSDT"), Err(Error::UnknownSymbol(_))));
    }

    #[test]
    fn test_replace_does_not_touch_held_snapshot() {
        let registry = SymbolRegistry::new();
        registry.replace(SymbolTable::new(vec![info("BTCUSDT", "BTC", "USDT")]));

        let held = registry.snapshot();
        registry.replace(SymbolTable::new(vec![info("ETHUSDT", "ETH", "USDT")]));

        assert!(held.resolve("BTCUSDT").is_ok());
        assert!(registry.snapshot().resolve("BTCUSDT").is_err());
        assert!(registry.snapshot().resolve("ETHUSDT").is_ok());
    }
}
