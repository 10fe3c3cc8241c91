use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub price_feed: PriceFeedConfig,
}

/// Parameters for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address to bind to (e.g., "127.0.0.1").
    pub host: String,
    /// The port to listen on.
    pub port: u16,
}

/// Parameters for the current-price resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceFeedConfig {
    /// Base URL of the primary market feed (Binance spot REST).
    pub primary_base_url: String,
    /// Base URL of the secondary market feed (CoinGecko simple price).
    pub secondary_base_url: String,
    /// How long a cached quote stays servable, in seconds.
    pub cache_ttl_secs: u64,
    /// Per-request timeout for feed calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            primary_base_url: "https://api.binance.com".to_string(),
            secondary_base_url: "https://api.coingecko.com".to_string(),
            cache_ttl_secs: 60,
            request_timeout_secs: 5,
        }
    }
}
