//! # Summit Pricing Crate
//!
//! Best-effort current-price resolution for the exit-strategy engine.
//!
//! The resolver contract is deliberately degrading: it always produces *some*
//! price, walking down a fixed ladder of sources (primary market feed,
//! secondary market feed, last cached quote, and finally the caller-supplied
//! average entry price). The provenance of the returned quote is tagged so
//! downstream consumers can flag estimated values in the UI.

use async_trait::async_trait;
use core_types::{PriceQuote, PriceSource};
use uuid::Uuid;

pub mod error;
pub mod live_resolver;

pub use error::PricingError;
pub use live_resolver::LivePriceResolver;

/// The abstract interface the engine consumes for market prices.
///
/// Implementations must never fail outright: when no live data is available
/// they degrade to the caller's `fallback_entry_price` with the
/// `EstimatedFromEntry` source tag.
#[async_trait]
pub trait PriceResolver: Send + Sync {
    async fn resolve(&self, account_id: Uuid, symbol: &str, fallback_entry_price: f64)
        -> PriceQuote;
}

/// A resolver backed by a fixed symbol → price table. Symbols absent from
/// the table degrade to the entry-price estimate, same as the live ladder.
#[derive(Debug, Default)]
pub struct FixedPriceResolver {
    prices: std::collections::HashMap<String, f64>,
}

impl FixedPriceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.trim().to_uppercase(), price);
        self
    }
}

#[async_trait]
impl PriceResolver for FixedPriceResolver {
    async fn resolve(
        &self,
        _account_id: Uuid,
        symbol: &str,
        fallback_entry_price: f64,
    ) -> PriceQuote {
        match self.prices.get(&symbol.trim().to_uppercase()) {
            Some(&price) => PriceQuote {
                price,
                source: PriceSource::MarketFeedPrimary,
                is_estimated: false,
            },
            None => PriceQuote::estimated_from_entry(fallback_entry_price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_resolver_returns_table_price() {
        let resolver = FixedPriceResolver::new().with_price("btc", 65_000.0);
        let quote = resolver.resolve(Uuid::new_v4(), "BTC", 100.0).await;
        assert_eq!(quote.price, 65_000.0);
        assert_eq!(quote.source, PriceSource::MarketFeedPrimary);
        assert!(!quote.is_estimated);
    }

    #[tokio::test]
    async fn fixed_resolver_degrades_to_entry_price() {
        let resolver = FixedPriceResolver::new();
        let quote = resolver.resolve(Uuid::new_v4(), "ETH", 1_800.0).await;
        assert_eq!(quote.price, 1_800.0);
        assert_eq!(quote.source, PriceSource::EstimatedFromEntry);
        assert!(quote.is_estimated);
    }
}
