use crate::error::PricingError;
use crate::PriceResolver;
use async_trait::async_trait;
use configuration::PriceFeedConfig;
use core_types::{PriceQuote, PriceSource};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Response shape of the Binance spot ticker endpoint. The price arrives as
/// a decimal string.
#[derive(Debug, Deserialize)]
struct BinanceTicker {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// A quote held in the process-local cache.
#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    price: f64,
    fetched_at: Instant,
}

/// The production resolver: primary feed (Binance spot REST), secondary feed
/// (CoinGecko simple price), then the last cached quote, then the caller's
/// entry-price estimate.
pub struct LivePriceResolver {
    client: reqwest::Client,
    config: PriceFeedConfig,
    cache: RwLock<HashMap<String, CachedQuote>>,
}

impl LivePriceResolver {
    pub fn new(config: PriceFeedConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches a spot quote from the primary feed. USD pricing is proxied by
    /// the USDT pair, which is how the dashboard quotes every asset.
    async fn fetch_primary(&self, symbol: &str) -> Result<f64, PricingError> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}USDT",
            self.config.primary_base_url, symbol
        );
        let ticker: BinanceTicker = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        ticker
            .price
            .parse::<f64>()
            .map_err(|e| PricingError::BadPayload(format!("unparseable price: {e}")))
    }

    /// Fetches from the secondary feed. CoinGecko keys simple-price lookups
    /// by coin id; the lowercased symbol works for the major assets and a
    /// miss just moves us down the degradation ladder.
    async fn fetch_secondary(&self, symbol: &str) -> Result<f64, PricingError> {
        let id = symbol.to_lowercase();
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=usd",
            self.config.secondary_base_url, id
        );
        let body: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.get(&id)
            .and_then(|m| m.get("usd"))
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| PricingError::NoQuote(symbol.to_string()))
    }

    async fn cached(&self, symbol: &str) -> Option<f64> {
        let cache = self.cache.read().await;
        let entry = cache.get(symbol)?;
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        (entry.fetched_at.elapsed() <= ttl).then_some(entry.price)
    }

    async fn remember(&self, symbol: &str, price: f64) {
        let mut cache = self.cache.write().await;
        cache.insert(
            symbol.to_string(),
            CachedQuote {
                price,
                fetched_at: Instant::now(),
            },
        );
    }
}

#[async_trait]
impl PriceResolver for LivePriceResolver {
    async fn resolve(
        &self,
        _account_id: Uuid,
        symbol: &str,
        fallback_entry_price: f64,
    ) -> PriceQuote {
        let symbol = symbol.trim().to_uppercase();

        match self.fetch_primary(&symbol).await {
            Ok(price) if price.is_finite() && price > 0.0 => {
                self.remember(&symbol, price).await;
                return PriceQuote {
                    price,
                    source: PriceSource::MarketFeedPrimary,
                    is_estimated: false,
                };
            }
            Ok(price) => {
                tracing::debug!(%symbol, price, "primary feed returned non-positive price");
            }
            Err(e) => {
                tracing::debug!(%symbol, error = %e, "primary price feed unavailable");
            }
        }

        match self.fetch_secondary(&symbol).await {
            Ok(price) => {
                self.remember(&symbol, price).await;
                return PriceQuote {
                    price,
                    source: PriceSource::MarketFeedSecondary,
                    is_estimated: false,
                };
            }
            Err(e) => {
                tracing::debug!(%symbol, error = %e, "secondary price feed unavailable");
            }
        }

        if let Some(price) = self.cached(&symbol).await {
            return PriceQuote {
                price,
                source: PriceSource::Cached,
                is_estimated: true,
            };
        }

        tracing::debug!(%symbol, "no market data; estimating from entry price");
        PriceQuote::estimated_from_entry(fallback_entry_price)
    }
}
