//! Pure scale-out planning math.
//!
//! Everything here is a deterministic function over a position snapshot and
//! a strategy's parameters, so the projected schedule, the next-step scan and
//! the stateless simulator share one implementation and cannot drift apart.

use crate::report::{AssetSummary, ScaleOutStep};
use core_types::{round_dp, PriceQuote, StepStatus};
use std::collections::HashMap;

/// The gain-step ladder is scanned at most this far when looking for the
/// next unexecuted step. A strategy that has genuinely executed 50+ steps
/// falls back to the base gain percent; this is a known limit, not a target.
pub const MAX_STEP_SCAN: u32 = 50;

/// Default number of rows in a projected schedule.
pub const DEFAULT_MAX_STEPS: u32 = 10;

/// The persisted values of one historical fill. When a step has a fill, the
/// stored facts override the projection verbatim.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionFill {
    pub executed_price: f64,
    pub quantity_sold: f64,
    pub proceeds: f64,
    pub realized_profit: f64,
}

/// Keys a gain level for equality comparison, rounded to 2 decimal places.
/// This rounding is the tie-break for "has this step already fired".
pub fn gain_key(gain_percent: f64) -> i64 {
    (gain_percent * 100.0).round() as i64
}

/// Finds the first gain level on the ladder without a recorded execution.
///
/// Scans `gain_percent * i` for `i = 1..=MAX_STEP_SCAN`. On exhaustion the
/// base `gain_percent` is returned. That is a defined but degenerate edge
/// case.
pub fn next_unexecuted_gain(
    gain_percent: f64,
    executions: &HashMap<i64, ExecutionFill>,
) -> f64 {
    for i in 1..=MAX_STEP_SCAN {
        let candidate = round_dp(gain_percent * i as f64, 2);
        if !executions.contains_key(&gain_key(candidate)) {
            return candidate;
        }
    }
    tracing::warn!(
        gain_percent,
        "all {MAX_STEP_SCAN} ladder steps executed; falling back to base gain"
    );
    gain_percent
}

/// Computes the next-step summary for one asset from a position snapshot, a
/// resolved quote and the next unexecuted gain level.
///
/// A step is ready when the current price has reached the target and the
/// target is positive (a zero entry price yields a zero target, which is
/// never actionable). Distance to target is floored at zero once the price
/// is past the target.
pub fn summarize_asset(
    coin: &str,
    qty_open: f64,
    entry_price_usd: f64,
    sell_percent: f64,
    next_gain_percent: f64,
    quote: PriceQuote,
) -> AssetSummary {
    let target_price_usd = if entry_price_usd > 0.0 {
        entry_price_usd * (1.0 + next_gain_percent / 100.0)
    } else {
        0.0
    };
    let current_price_usd = quote.price;

    let qty_to_sell = if qty_open > 0.0 {
        qty_open * (sell_percent / 100.0)
    } else {
        0.0
    };
    let usd_value_to_sell = qty_to_sell * target_price_usd;

    let distance_to_target_percent = if current_price_usd > 0.0 && target_price_usd > 0.0 {
        ((target_price_usd - current_price_usd) / current_price_usd * 100.0).max(0.0)
    } else {
        0.0
    };

    let ready = current_price_usd >= target_price_usd && target_price_usd > 0.0;

    AssetSummary {
        coin_symbol: coin.to_string(),
        qty_open: round_dp(qty_open, 8),
        entry_price_usd: round_dp(entry_price_usd, 8),
        current_price_usd: round_dp(current_price_usd, 8),
        current_price_source: quote.source,
        current_price_is_estimated: quote.is_estimated,
        next_gain_percent,
        target_price_usd: round_dp(target_price_usd, 8),
        qty_to_sell: round_dp(qty_to_sell, 8),
        usd_value_to_sell: round_dp(usd_value_to_sell, 2),
        distance_to_target_percent: round_dp(distance_to_target_percent, 2),
        status: if ready {
            StepStatus::Ready
        } else {
            StepStatus::Pending
        },
    }
}

/// Builds the projected liquidation schedule for one asset.
///
/// A single pass walks the gain ladder, at each step preferring a recorded
/// historical fill (matched by rounded gain level) over the forward
/// simulation. `remaining` shrinks by the executed quantity when a fill
/// exists, else by the planned quantity, and the walk stops as soon as the
/// position is fully liquidated, so there are no trailing zero-quantity rows.
pub fn build_schedule(
    qty_open: f64,
    entry_price_usd: f64,
    sell_percent: f64,
    gain_step: f64,
    max_steps: u32,
    executions: &HashMap<i64, ExecutionFill>,
) -> Vec<ScaleOutStep> {
    let sell_fraction = sell_percent / 100.0;
    let mut remaining = qty_open;
    let mut cumulative = 0.0;
    let mut rows = Vec::new();

    for i in 1..=max_steps {
        let gain = round_dp(gain_step * i as f64, 2);
        let target = if entry_price_usd > 0.0 {
            entry_price_usd * (1.0 + gain / 100.0)
        } else {
            0.0
        };
        let planned_qty = if remaining > 0.0 {
            remaining * sell_fraction
        } else {
            0.0
        };

        let fill = executions.get(&gain_key(gain));
        let qty_sold_now = fill.map_or(planned_qty, |f| f.quantity_sold);
        remaining = (remaining - qty_sold_now).max(0.0);

        let (proceeds, profit) = match fill {
            Some(f) => (f.proceeds, f.realized_profit),
            None => (
                qty_sold_now * target,
                qty_sold_now * (target - entry_price_usd),
            ),
        };
        cumulative += profit;

        rows.push(ScaleOutStep {
            gain_percent: gain,
            target_price_usd: round_dp(target, 8),
            planned_qty_to_sell: round_dp(planned_qty, 8),
            executed_qty_to_sell: fill.map(|f| round_dp(f.quantity_sold, 8)),
            proceeds_usd: round_dp(proceeds, 2),
            remaining_qty_after: round_dp(remaining, 8),
            realized_profit_usd: round_dp(profit, 2),
            cumulative_realized_profit_usd: round_dp(cumulative, 2),
            is_executed: fill.is_some(),
        });

        if remaining <= 0.0 {
            break;
        }
    }

    rows
}

/// The stateless simulator: same ladder walk with no execution history.
/// Every row is planned; numerically identical to what [`build_schedule`]
/// produces for a brand-new strategy with zero executions.
pub fn simulate_schedule(
    qty_open: f64,
    entry_price_usd: f64,
    sell_percent: f64,
    gain_step: f64,
    max_steps: u32,
) -> Vec<ScaleOutStep> {
    build_schedule(
        qty_open,
        entry_price_usd,
        sell_percent,
        gain_step,
        max_steps,
        &HashMap::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::PriceSource;
    use pricing::{FixedPriceResolver, PriceResolver};
    use uuid::Uuid;

    fn live_quote(price: f64) -> PriceQuote {
        PriceQuote {
            price,
            source: PriceSource::MarketFeedPrimary,
            is_estimated: false,
        }
    }

    #[test]
    fn distance_to_target_floors_at_zero_past_target() {
        // Entry $100, +30% target $130, price already at $150.
        let summary = summarize_asset("BTC", 10.0, 100.0, 25.0, 30.0, live_quote(150.0));
        assert_eq!(summary.distance_to_target_percent, 0.0);
        assert_eq!(summary.status, StepStatus::Ready);

        // Below target the distance is positive: (130 - 104) / 104 * 100.
        let summary = summarize_asset("BTC", 10.0, 100.0, 25.0, 30.0, live_quote(104.0));
        assert_eq!(summary.distance_to_target_percent, 25.0);
        assert_eq!(summary.status, StepStatus::Pending);
    }

    #[test]
    fn step_is_ready_exactly_at_target_price() {
        let summary = summarize_asset("ETH", 4.0, 100.0, 25.0, 30.0, live_quote(130.0));
        assert_eq!(summary.status, StepStatus::Ready);
        assert_eq!(summary.distance_to_target_percent, 0.0);

        let summary = summarize_asset("ETH", 4.0, 100.0, 25.0, 30.0, live_quote(129.99));
        assert_eq!(summary.status, StepStatus::Pending);
    }

    #[test]
    fn zero_entry_price_is_never_ready() {
        // No cost basis means no target, regardless of the current price.
        let summary = summarize_asset("SOL", 10.0, 0.0, 25.0, 30.0, live_quote(500.0));
        assert_eq!(summary.target_price_usd, 0.0);
        assert_eq!(summary.usd_value_to_sell, 0.0);
        assert_eq!(summary.status, StepStatus::Pending);
        assert_eq!(summary.distance_to_target_percent, 0.0);
    }

    #[test]
    fn quantity_and_value_to_sell() {
        let summary = summarize_asset("BTC", 10.0, 100.0, 25.0, 30.0, live_quote(110.0));
        assert_eq!(summary.qty_to_sell, 2.5);
        assert_eq!(summary.usd_value_to_sell, 325.0);

        let summary = summarize_asset("BTC", 0.0, 100.0, 25.0, 30.0, live_quote(110.0));
        assert_eq!(summary.qty_to_sell, 0.0);
        assert_eq!(summary.usd_value_to_sell, 0.0);
    }

    #[tokio::test]
    async fn estimated_quote_flag_propagates_into_summary() {
        // Resolver has no quote for the symbol, so it degrades to the entry
        // price and the summary must carry the estimate marker.
        let resolver = FixedPriceResolver::new();
        let quote = resolver.resolve(Uuid::nil(), "DOT", 100.0).await;
        let summary = summarize_asset("DOT", 10.0, 100.0, 25.0, 30.0, quote);

        assert!(summary.current_price_is_estimated);
        assert_eq!(summary.current_price_source, PriceSource::EstimatedFromEntry);
        assert_eq!(summary.current_price_usd, 100.0);
        // The estimated entry price sits below the +30% target.
        assert_eq!(summary.status, StepStatus::Pending);

        let resolver = FixedPriceResolver::new().with_price("DOT", 140.0);
        let quote = resolver.resolve(Uuid::nil(), "DOT", 100.0).await;
        let summary = summarize_asset("DOT", 10.0, 100.0, 25.0, 30.0, quote);
        assert!(!summary.current_price_is_estimated);
        assert_eq!(summary.status, StepStatus::Ready);
    }

    #[test]
    fn worked_scenario_exact_values() {
        // qty=10, entry=$100, sell 25% per step, +30% gain steps.
        let rows = simulate_schedule(10.0, 100.0, 25.0, 30.0, 10);

        let step1 = &rows[0];
        assert_eq!(step1.gain_percent, 30.0);
        assert_eq!(step1.target_price_usd, 130.0);
        assert_eq!(step1.planned_qty_to_sell, 2.5);
        assert_eq!(step1.remaining_qty_after, 7.5);
        assert_eq!(step1.proceeds_usd, 325.0);
        assert_eq!(step1.realized_profit_usd, 75.0);

        let step2 = &rows[1];
        assert_eq!(step2.gain_percent, 60.0);
        assert_eq!(step2.target_price_usd, 160.0);
        assert_eq!(step2.planned_qty_to_sell, 1.875);
        assert_eq!(step2.remaining_qty_after, 5.625);
    }

    #[test]
    fn remaining_quantity_is_monotonically_non_increasing() {
        let rows = simulate_schedule(10.0, 100.0, 40.0, 25.0, 10);
        let mut previous = 10.0;
        for row in &rows {
            assert!(row.remaining_qty_after <= previous);
            previous = row.remaining_qty_after;
        }
    }

    #[test]
    fn schedule_stops_at_full_liquidation() {
        // Selling 100% per step liquidates on step 1; no trailing rows.
        let rows = simulate_schedule(10.0, 100.0, 100.0, 30.0, 10);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].remaining_qty_after, 0.0);
    }

    #[test]
    fn executed_step_overrides_projection_verbatim() {
        let mut executions = HashMap::new();
        executions.insert(
            gain_key(30.0),
            ExecutionFill {
                executed_price: 133.7,
                quantity_sold: 3.0,
                proceeds: 401.1,
                realized_profit: 101.1,
            },
        );

        let rows = build_schedule(10.0, 100.0, 25.0, 30.0, 10, &executions);

        let step1 = &rows[0];
        assert!(step1.is_executed);
        assert_eq!(step1.executed_qty_to_sell, Some(3.0));
        // Stored facts, not the simulated target-price values.
        assert_eq!(step1.proceeds_usd, 401.1);
        assert_eq!(step1.realized_profit_usd, 101.1);
        // Remaining shrinks by the executed quantity, not the planned one.
        assert_eq!(step1.remaining_qty_after, 7.0);

        let step2 = &rows[1];
        assert!(!step2.is_executed);
        assert_eq!(step2.planned_qty_to_sell, 1.75);
    }

    #[test]
    fn simulator_matches_schedule_with_no_executions() {
        let simulated = simulate_schedule(7.3, 412.55, 33.0, 12.5, 10);
        let scheduled = build_schedule(7.3, 412.55, 33.0, 12.5, 10, &HashMap::new());
        assert_eq!(simulated, scheduled);
        assert!(simulated.iter().all(|r| !r.is_executed));
        assert!(simulated.iter().all(|r| r.executed_qty_to_sell.is_none()));
    }

    #[test]
    fn zero_entry_price_produces_zero_targets() {
        let rows = simulate_schedule(10.0, 0.0, 25.0, 30.0, 3);
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.target_price_usd, 0.0);
            assert_eq!(row.proceeds_usd, 0.0);
        }
    }

    #[test]
    fn zero_quantity_produces_empty_planned_rows() {
        let rows = simulate_schedule(0.0, 100.0, 25.0, 30.0, 3);
        // remaining starts at 0, so the first row already terminates the walk.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].planned_qty_to_sell, 0.0);
        assert_eq!(rows[0].remaining_qty_after, 0.0);
    }

    #[test]
    fn next_gain_skips_executed_levels() {
        let fill = ExecutionFill {
            executed_price: 0.0,
            quantity_sold: 0.0,
            proceeds: 0.0,
            realized_profit: 0.0,
        };
        let mut executions = HashMap::new();
        executions.insert(gain_key(30.0), fill);
        executions.insert(gain_key(60.0), fill);

        assert_eq!(next_unexecuted_gain(30.0, &executions), 90.0);
        assert_eq!(next_unexecuted_gain(30.0, &HashMap::new()), 30.0);
    }

    #[test]
    fn exhausted_ladder_falls_back_to_base_gain() {
        let fill = ExecutionFill {
            executed_price: 0.0,
            quantity_sold: 0.0,
            proceeds: 0.0,
            realized_profit: 0.0,
        };
        let mut executions = HashMap::new();
        for i in 1..=MAX_STEP_SCAN {
            executions.insert(gain_key(round_dp(10.0 * i as f64, 2)), fill);
        }
        assert_eq!(next_unexecuted_gain(10.0, &executions), 10.0);
    }

    #[test]
    fn gain_key_equality_is_two_decimal_places() {
        assert_eq!(gain_key(30.0), gain_key(30.0000001));
        assert_eq!(gain_key(30.004), gain_key(30.0));
        assert_ne!(gain_key(30.0), gain_key(30.01));
    }
}
