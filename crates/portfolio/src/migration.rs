use crate::error::PortfolioError;
use core_types::TradeKind;
use database::{DbLegacyEntry, DbRepository, NewTradeEvent};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

/// Note marker on legacy rows created by the old portfolio add-asset flow.
/// These become `Init` (opening balance) events.
const LEGACY_ADD_MARKER: &str = "[PORTFOLIO_ADD]";

/// Converts legacy-format journal rows into canonical ledger events.
///
/// Idempotence comes from two layers: a deterministic `[MIGRATED_JE:<id>]`
/// marker written into each migrated row's note, checked against the ledger
/// before inserting (correct across restarts), and a process-lifetime set of
/// already-migrated accounts used purely as a fast path. Legacy rows are
/// never mutated or deleted.
pub struct LegacyMigrator {
    repo: DbRepository,
    migrated_accounts: Mutex<HashSet<Uuid>>,
}

impl LegacyMigrator {
    pub fn new(repo: DbRepository) -> Self {
        Self {
            repo,
            migrated_accounts: Mutex::new(HashSet::new()),
        }
    }

    /// Backfills the canonical ledger for one account. Returns the number of
    /// rows migrated by this call (0 when already done).
    pub async fn migrate(&self, account_id: Uuid) -> Result<u64, PortfolioError> {
        if self.already_migrated(account_id) {
            return Ok(0);
        }

        let legacy_rows = self.repo.list_legacy_portfolio_entries(account_id).await?;
        if legacy_rows.is_empty() {
            self.mark_migrated(account_id);
            return Ok(0);
        }

        let markers: Vec<String> = legacy_rows.iter().map(|r| migration_marker(r.id)).collect();
        let existing: HashSet<String> = self
            .repo
            .find_existing_migration_notes(account_id, &markers)
            .await?
            .into_iter()
            .collect();

        let to_create: Vec<NewTradeEvent> = legacy_rows
            .iter()
            .filter(|r| !existing.contains(&migration_marker(r.id)))
            .filter_map(|r| convert_legacy_entry(account_id, r))
            .collect();

        let count = self.repo.insert_trade_events(&to_create).await?;
        if count > 0 {
            tracing::info!(%account_id, count, "migrated legacy portfolio trades");
        }

        self.mark_migrated(account_id);
        Ok(count)
    }

    fn already_migrated(&self, account_id: Uuid) -> bool {
        self.migrated_accounts
            .lock()
            .map(|set| set.contains(&account_id))
            .unwrap_or(false)
    }

    fn mark_migrated(&self, account_id: Uuid) {
        if let Ok(mut set) = self.migrated_accounts.lock() {
            set.insert(account_id);
        }
    }
}

fn migration_marker(legacy_id: Uuid) -> String {
    format!("[MIGRATED_JE:{legacy_id}]")
}

/// Coerces a nullable stored number into a usable f64, treating missing and
/// non-finite values as zero so they fall out via the positivity checks.
fn sanitize(value: Option<f64>) -> f64 {
    match value {
        Some(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Maps one legacy journal row to a canonical ledger event, or `None` when
/// the row cannot participate (non-positive quantity or price).
fn convert_legacy_entry(account_id: Uuid, row: &DbLegacyEntry) -> Option<NewTradeEvent> {
    let quantity = sanitize(row.amount);
    let price_usd = sanitize(row.entry_price);
    if quantity <= 0.0 || price_usd <= 0.0 {
        return None;
    }

    let is_sell = row.side.eq_ignore_ascii_case("sell");
    let fee_usd = sanitize(if is_sell { row.sell_fee } else { row.buy_fee });

    let kind = if row.notes_entry.as_deref() == Some(LEGACY_ADD_MARKER) {
        TradeKind::Init
    } else if is_sell {
        TradeKind::Sell
    } else {
        TradeKind::Buy
    };

    Some(NewTradeEvent {
        account_id,
        symbol: row.asset_name.trim().to_uppercase(),
        kind,
        quantity,
        price_usd,
        fee_usd,
        executed_at: row.trade_datetime,
        note: Some(migration_marker(row.id)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn legacy_row(side: &str, amount: f64, price: f64, notes: Option<&str>) -> DbLegacyEntry {
        DbLegacyEntry {
            id: Uuid::new_v4(),
            asset_name: "btc".to_string(),
            side: side.to_string(),
            amount: Some(amount),
            entry_price: Some(price),
            buy_fee: Some(1.5),
            sell_fee: Some(2.5),
            trade_datetime: Utc::now(),
            notes_entry: notes.map(str::to_string),
        }
    }

    #[test]
    fn portfolio_add_rows_become_init_events() {
        let row = legacy_row("buy", 2.0, 100.0, Some("[PORTFOLIO_ADD]"));
        let event = convert_legacy_entry(Uuid::new_v4(), &row).unwrap();
        assert_eq!(event.kind, TradeKind::Init);
        assert_eq!(event.symbol, "BTC");
        assert_eq!(event.fee_usd, 1.5);
        // Inits consume cash like buys.
        assert_eq!(event.cash_delta_usd(), -(100.0 * 2.0 + 1.5));
    }

    #[test]
    fn sell_rows_use_sell_fee_and_release_cash() {
        let row = legacy_row("sell", 1.0, 150.0, Some("[PORTFOLIO_SPOT_TX] cg:bitcoin"));
        let event = convert_legacy_entry(Uuid::new_v4(), &row).unwrap();
        assert_eq!(event.kind, TradeKind::Sell);
        assert_eq!(event.fee_usd, 2.5);
        assert_eq!(event.cash_delta_usd(), 150.0 - 2.5);
    }

    #[test]
    fn non_positive_rows_are_skipped() {
        let zero_qty = legacy_row("buy", 0.0, 100.0, None);
        assert!(convert_legacy_entry(Uuid::new_v4(), &zero_qty).is_none());

        let mut nan_price = legacy_row("buy", 1.0, 100.0, None);
        nan_price.entry_price = Some(f64::NAN);
        assert!(convert_legacy_entry(Uuid::new_v4(), &nan_price).is_none());

        let missing = DbLegacyEntry {
            amount: None,
            ..legacy_row("buy", 1.0, 100.0, None)
        };
        assert!(convert_legacy_entry(Uuid::new_v4(), &missing).is_none());
    }

    #[test]
    fn marker_is_deterministic_per_legacy_row() {
        let id = Uuid::new_v4();
        assert_eq!(migration_marker(id), migration_marker(id));
        assert!(migration_marker(id).starts_with("[MIGRATED_JE:"));
    }
}
