use serde::{Deserialize, Serialize};

/// The kind of a canonical ledger event.
///
/// `Init` is an opening balance recorded when a user adds an existing asset
/// to the portfolio. It behaves identically to `Buy` in position math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
    Init,
}

impl TradeKind {
    /// Whether this event adds to the position (buys and opening balances).
    pub fn is_acquisition(&self) -> bool {
        matches!(self, TradeKind::Buy | TradeKind::Init)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Buy => "buy",
            TradeKind::Sell => "sell",
            TradeKind::Init => "init",
        }
    }

    /// Parses a stored kind string. Unknown values resolve to `Buy`, matching
    /// the tolerant read path of the ledger store.
    pub fn parse_lossy(s: &str) -> TradeKind {
        match s.to_ascii_lowercase().as_str() {
            "sell" => TradeKind::Sell,
            "init" => TradeKind::Init,
            _ => TradeKind::Buy,
        }
    }
}

/// Provenance of a resolved current price, from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Live quote from the primary market feed.
    MarketFeedPrimary,
    /// Live quote from the secondary market feed.
    MarketFeedSecondary,
    /// Last known good quote from the resolver's cache.
    Cached,
    /// No market data available; the caller's entry price was used.
    EstimatedFromEntry,
}

/// Whether the next scale-out step is actionable at the current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Ready,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lossy_defaults_to_buy() {
        assert_eq!(TradeKind::parse_lossy("sell"), TradeKind::Sell);
        assert_eq!(TradeKind::parse_lossy("INIT"), TradeKind::Init);
        assert_eq!(TradeKind::parse_lossy("whatever"), TradeKind::Buy);
    }

    #[test]
    fn init_counts_as_acquisition() {
        assert!(TradeKind::Init.is_acquisition());
        assert!(TradeKind::Buy.is_acquisition());
        assert!(!TradeKind::Sell.is_acquisition());
    }
}
