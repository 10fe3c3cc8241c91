use crate::error::PortfolioError;
use crate::migration::LegacyMigrator;
use chrono::{DateTime, Utc};
use core_types::{Position, TradeEvent, TradeKind, POSITION_EPSILON};
use database::DbRepository;
use pricing::PriceResolver;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Running weighted-average-cost state for one symbol during a replay.
#[derive(Debug, Clone, Copy, Default)]
struct RunningPosition {
    quantity: f64,
    invested_usd: f64,
}

impl RunningPosition {
    fn avg_entry(&self) -> f64 {
        if self.quantity > 0.0 {
            self.invested_usd / self.quantity
        } else {
            0.0
        }
    }

    /// Applies one ledger event. Buys and opening balances grow the cost
    /// basis (fee included); sells reduce quantity at the running average,
    /// clipped to what is held. The ledger cannot represent a short.
    fn apply(&mut self, event: &TradeEvent) {
        if event.kind.is_acquisition() {
            self.quantity += event.quantity;
            self.invested_usd += event.quantity * event.price_usd + event.fee_usd;
            return;
        }

        let avg = self.avg_entry();
        let reduce_qty = event.quantity.min(self.quantity);
        self.quantity -= reduce_qty;
        self.invested_usd = (self.invested_usd - reduce_qty * avg).max(0.0);

        if self.quantity < POSITION_EPSILON {
            // Fully closed: absorb float drift rather than carrying dust.
            self.quantity = 0.0;
            self.invested_usd = 0.0;
        }
    }
}

/// Replays ledger events (already in ascending chronological order) into one
/// position per symbol. Malformed events are skipped; only strictly positive
/// net quantities survive. Output is sorted by symbol for determinism.
pub fn replay(events: &[TradeEvent]) -> Vec<Position> {
    let mut by_symbol: BTreeMap<&str, RunningPosition> = BTreeMap::new();

    for event in events {
        if !event.is_well_formed() {
            tracing::debug!(id = %event.id, symbol = %event.symbol, "skipping malformed ledger row");
            continue;
        }
        by_symbol
            .entry(event.symbol.as_str())
            .or_default()
            .apply(event);
    }

    by_symbol
        .into_iter()
        .filter(|(_, running)| running.quantity > 0.0)
        .map(|(symbol, running)| Position {
            symbol: symbol.to_string(),
            quantity: running.quantity,
            invested_usd: running.invested_usd,
            avg_entry_price_usd: running.avg_entry(),
        })
        .collect()
}

/// One row of the per-asset transaction tape in an [`AssetReport`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    pub kind: TradeKind,
    pub executed_at: DateTime<Utc>,
    pub quantity: f64,
    pub price_usd: f64,
    pub total_usd: f64,
    /// Realized gain/loss for sells, against the average cost at sale time.
    pub gain_loss_usd: Option<f64>,
    pub gain_loss_pct: Option<f64>,
}

/// The full per-asset view: current position, profit breakdown, and the
/// transaction tape (newest first).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReport {
    pub symbol: String,
    pub quantity: f64,
    pub invested_usd: f64,
    pub avg_entry_price_usd: f64,
    pub current_price_usd: f64,
    pub current_price_is_estimated: bool,
    pub holdings_value_usd: f64,
    pub total_invested_usd: f64,
    pub realized_profit_usd: f64,
    pub unrealized_profit_usd: f64,
    pub total_profit_usd: f64,
    pub total_profit_pct: f64,
    pub transactions: Vec<TransactionView>,
}

/// Read-side aggregator: replays the canonical ledger into positions.
///
/// Every entry point runs the legacy migration first (best-effort: a failed
/// migration is logged and the read proceeds on whatever canonical data
/// already exists).
#[derive(Clone)]
pub struct HoldingsService {
    repo: DbRepository,
    migrator: Arc<LegacyMigrator>,
}

impl HoldingsService {
    pub fn new(repo: DbRepository, migrator: Arc<LegacyMigrator>) -> Self {
        Self { repo, migrator }
    }

    /// The current open position for one asset, or `None` when nothing is
    /// held after replay.
    pub async fn position(
        &self,
        account_id: Uuid,
        symbol: &str,
    ) -> Result<Option<Position>, PortfolioError> {
        self.migrate_best_effort(account_id).await;

        let symbol = symbol.trim().to_uppercase();
        let events = self.repo.list_trade_events(account_id, Some(&symbol)).await?;
        Ok(replay(&events).into_iter().find(|p| p.symbol == symbol))
    }

    /// All open positions for an account, sorted by symbol. CASH never
    /// appears: it is excluded at the ledger read.
    pub async fn all_positions(&self, account_id: Uuid) -> Result<Vec<Position>, PortfolioError> {
        self.migrate_best_effort(account_id).await;

        let events = self.repo.list_trade_events(account_id, None).await?;
        Ok(replay(&events))
    }

    /// The detailed per-asset view: position, realized/unrealized profit and
    /// the transaction tape. `None` when the asset has no ledger history.
    pub async fn asset_report(
        &self,
        account_id: Uuid,
        symbol: &str,
        resolver: &dyn PriceResolver,
    ) -> Result<Option<AssetReport>, PortfolioError> {
        self.migrate_best_effort(account_id).await;

        let symbol = symbol.trim().to_uppercase();
        let events = self.repo.list_trade_events(account_id, Some(&symbol)).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let mut running = RunningPosition::default();
        let mut total_invested_usd = 0.0;
        let mut realized_profit_usd = 0.0;
        let mut transactions = Vec::with_capacity(events.len());

        for event in &events {
            if !event.is_well_formed() {
                continue;
            }
            let gross = event.quantity * event.price_usd;

            if event.kind.is_acquisition() {
                total_invested_usd += gross + event.fee_usd;
                transactions.push(TransactionView {
                    id: event.id,
                    kind: event.kind,
                    executed_at: event.executed_at,
                    quantity: event.quantity,
                    price_usd: event.price_usd,
                    total_usd: gross + event.fee_usd,
                    gain_loss_usd: None,
                    gain_loss_pct: None,
                });
            } else {
                let avg = running.avg_entry();
                let gain_loss = (event.price_usd - avg) * event.quantity - event.fee_usd;
                realized_profit_usd += gain_loss;
                transactions.push(TransactionView {
                    id: event.id,
                    kind: event.kind,
                    executed_at: event.executed_at,
                    quantity: event.quantity,
                    price_usd: event.price_usd,
                    total_usd: gross - event.fee_usd,
                    gain_loss_usd: gain_loss.is_finite().then_some(gain_loss),
                    gain_loss_pct: (avg > 0.0)
                        .then(|| (event.price_usd - avg) / avg * 100.0)
                        .filter(|p| p.is_finite()),
                });
            }

            running.apply(event);
        }

        let avg_entry = running.avg_entry();
        let quote = resolver.resolve(account_id, &symbol, avg_entry).await;
        let current_price_usd = if quote.price > 0.0 { quote.price } else { avg_entry };

        let holdings_value_usd = running.quantity * current_price_usd;
        let unrealized_profit_usd = holdings_value_usd - running.invested_usd;
        let total_profit_usd = realized_profit_usd + unrealized_profit_usd;
        let total_profit_pct = if total_invested_usd > 0.0 {
            total_profit_usd / total_invested_usd * 100.0
        } else {
            0.0
        };

        // Newest first for display.
        transactions.reverse();

        Ok(Some(AssetReport {
            symbol,
            quantity: running.quantity,
            invested_usd: running.invested_usd,
            avg_entry_price_usd: avg_entry,
            current_price_usd,
            current_price_is_estimated: quote.is_estimated,
            holdings_value_usd,
            total_invested_usd,
            realized_profit_usd,
            unrealized_profit_usd,
            total_profit_usd,
            total_profit_pct,
            transactions,
        }))
    }

    /// Migration is an optimization of the read path, never a prerequisite:
    /// if it errors we proceed with whatever canonical data already exists.
    async fn migrate_best_effort(&self, account_id: Uuid) {
        if let Err(e) = self.migrator.migrate(account_id).await {
            tracing::warn!(%account_id, error = %e, "legacy migration failed; reading existing ledger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn event(symbol: &str, kind: TradeKind, qty: f64, price: f64, fee: f64, seq: i64) -> TradeEvent {
        TradeEvent {
            id: Uuid::new_v4(),
            account_id: Uuid::nil(),
            symbol: symbol.to_string(),
            kind,
            quantity: qty,
            price_usd: price,
            fee_usd: fee,
            cash_delta_usd: 0.0,
            executed_at: Utc::now() + Duration::seconds(seq),
            note: None,
        }
    }

    #[test]
    fn buy_then_partial_sell_keeps_average_cost() {
        // Buy 10 @ $100 (invested $1000), sell 4 @ $150: avg stays $100,
        // 6 remain, invested $600.
        let events = vec![
            event("BTC", TradeKind::Buy, 10.0, 100.0, 0.0, 0),
            event("BTC", TradeKind::Sell, 4.0, 150.0, 0.0, 1),
        ];
        let positions = replay(&events);
        assert_eq!(positions.len(), 1);
        let p = &positions[0];
        assert!((p.quantity - 6.0).abs() < 1e-12);
        assert!((p.invested_usd - 600.0).abs() < 1e-9);
        assert!((p.avg_entry_price_usd - 100.0).abs() < 1e-9);
    }

    #[test]
    fn selling_never_changes_remaining_average() {
        let events = vec![
            event("ETH", TradeKind::Buy, 2.0, 1000.0, 0.0, 0),
            event("ETH", TradeKind::Buy, 2.0, 2000.0, 0.0, 1),
            event("ETH", TradeKind::Sell, 1.0, 5000.0, 0.0, 2),
        ];
        let p = &replay(&events)[0];
        // Average was $1500 before the sell and must still be $1500.
        assert!((p.avg_entry_price_usd - 1500.0).abs() < 1e-9);
        assert!((p.quantity - 3.0).abs() < 1e-12);
    }

    #[test]
    fn full_liquidation_zeroes_quantity_and_invested() {
        let events = vec![
            event("SOL", TradeKind::Buy, 3.0, 20.0, 0.0, 0),
            event("SOL", TradeKind::Sell, 3.0, 30.0, 0.0, 1),
        ];
        assert!(replay(&events).is_empty());
    }

    #[test]
    fn oversell_clips_to_held_quantity() {
        let events = vec![
            event("ADA", TradeKind::Buy, 5.0, 1.0, 0.0, 0),
            event("ADA", TradeKind::Sell, 12.0, 2.0, 0.0, 1),
        ];
        // Clipped to 5; no short position representable.
        assert!(replay(&events).is_empty());
    }

    #[test]
    fn epsilon_dust_counts_as_closed() {
        let events = vec![
            event("BTC", TradeKind::Buy, 1.0, 100.0, 0.0, 0),
            event("BTC", TradeKind::Sell, 1.0 - 5e-11, 100.0, 0.0, 1),
        ];
        // Residual 5e-11 is below the closure epsilon.
        assert!(replay(&events).is_empty());

        let events = vec![
            event("BTC", TradeKind::Buy, 1.0, 100.0, 0.0, 0),
            event("BTC", TradeKind::Sell, 1.0 - 2e-10, 100.0, 0.0, 1),
        ];
        // Residual 2e-10 is above the epsilon and stays open.
        assert_eq!(replay(&events).len(), 1);
    }

    #[test]
    fn init_behaves_like_buy_and_fees_increase_cost_basis() {
        let events = vec![
            event("DOT", TradeKind::Init, 10.0, 5.0, 2.0, 0),
            event("DOT", TradeKind::Buy, 10.0, 7.0, 3.0, 1),
        ];
        let p = &replay(&events)[0];
        assert!((p.quantity - 20.0).abs() < 1e-12);
        assert!((p.invested_usd - (50.0 + 2.0 + 70.0 + 3.0)).abs() < 1e-9);
    }

    #[test]
    fn malformed_events_are_skipped_not_fatal() {
        let mut bad = event("BTC", TradeKind::Buy, 0.0, 100.0, 0.0, 0);
        bad.quantity = f64::NAN;
        let events = vec![
            bad,
            event("BTC", TradeKind::Buy, -1.0, 100.0, 0.0, 1),
            event("BTC", TradeKind::Buy, 2.0, 100.0, 0.0, 2),
        ];
        let p = &replay(&events)[0];
        assert!((p.quantity - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sell_into_empty_position_is_a_no_op() {
        let events = vec![event("XRP", TradeKind::Sell, 4.0, 2.0, 0.0, 0)];
        assert!(replay(&events).is_empty());
    }

    #[test]
    fn replay_is_per_symbol_and_sorted() {
        let events = vec![
            event("ETH", TradeKind::Buy, 1.0, 2000.0, 0.0, 0),
            event("BTC", TradeKind::Buy, 1.0, 60000.0, 0.0, 1),
        ];
        let positions = replay(&events);
        assert_eq!(positions[0].symbol, "BTC");
        assert_eq!(positions[1].symbol, "ETH");
    }
}
