use crate::enums::{PriceSource, TradeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One canonical ledger event. Immutable once migrated; created by user
/// trade entry, portfolio add-asset (`Init`), or the legacy migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub symbol: String,
    pub kind: TradeKind,
    pub quantity: f64,
    pub price_usd: f64,
    pub fee_usd: f64,
    /// Signed cash movement: positive for sells, negative for buys/inits.
    pub cash_delta_usd: f64,
    pub executed_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl TradeEvent {
    /// Whether this event may participate in aggregation. Non-positive or
    /// non-finite quantities and prices are silently skipped, not rejected.
    pub fn is_well_formed(&self) -> bool {
        self.quantity.is_finite()
            && self.quantity > 0.0
            && self.price_usd.is_finite()
            && self.price_usd > 0.0
    }
}

/// The current open position for one asset, derived by replaying the ledger.
/// Never persisted; recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub invested_usd: f64,
    pub avg_entry_price_usd: f64,
}

/// A best-effort current price together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub price: f64,
    pub source: PriceSource,
    pub is_estimated: bool,
}

impl PriceQuote {
    pub fn estimated_from_entry(entry_price_usd: f64) -> Self {
        Self {
            price: entry_price_usd,
            source: PriceSource::EstimatedFromEntry,
            is_estimated: true,
        }
    }
}
