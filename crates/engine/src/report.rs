use core_types::{PriceSource, StepStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The next actionable scale-out step for one asset under a strategy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub coin_symbol: String,

    pub qty_open: f64,
    pub entry_price_usd: f64,

    pub current_price_usd: f64,
    pub current_price_source: PriceSource,
    pub current_price_is_estimated: bool,

    pub next_gain_percent: f64,
    pub target_price_usd: f64,
    pub qty_to_sell: f64,
    pub usd_value_to_sell: f64,
    /// How far above the current price the target still is, floored at 0.
    pub distance_to_target_percent: f64,

    pub status: StepStatus,
}

/// The list-view summary of one strategy across its resolved assets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub id: Uuid,
    pub is_all_coins: bool,
    /// Resolved at read time: for all-coins strategies this follows the
    /// portfolio as it grows and shrinks.
    pub coin_symbols: Vec<String>,
    pub strategy_type: String,
    pub sell_percent: f64,
    pub gain_percent: f64,
    pub is_active: bool,

    pub assets: Vec<AssetSummary>,
    pub total_assets: usize,
    /// Sum of `usd_value_to_sell` over assets whose step is ready now.
    pub total_profit_usd: f64,
}

/// One row of a projected liquidation schedule. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleOutStep {
    pub gain_percent: f64,
    pub target_price_usd: f64,
    pub planned_qty_to_sell: f64,
    /// Present only when this step has a recorded historical fill.
    pub executed_qty_to_sell: Option<f64>,
    pub proceeds_usd: f64,
    pub remaining_qty_after: f64,
    pub realized_profit_usd: f64,
    pub cumulative_realized_profit_usd: f64,
    pub is_executed: bool,
}

/// The detail view: summary plus the stitched historical/projected schedule
/// per resolved asset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDetails {
    pub summary: StrategySummary,
    pub rows_by_coin: BTreeMap<String, Vec<ScaleOutStep>>,
}

/// One asset's output from the stateless simulator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedAsset {
    pub coin_symbol: String,
    pub qty_open: f64,
    pub entry_price_usd: f64,
    pub rows: Vec<ScaleOutStep>,
}
