use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::{TradeEvent, TradeKind, CASH_SYMBOL};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

/// The transaction list endpoint never returns more rows than this.
pub const LEDGER_LIST_CAP: i64 = 250;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

/// A row from the canonical `portfolio_trades` ledger table.
#[derive(Debug, Clone, FromRow)]
struct DbTradeEvent {
    id: Uuid,
    account_id: Uuid,
    asset_name: String,
    kind: String,
    qty: f64,
    price_usd: f64,
    fee_usd: f64,
    cash_delta_usd: f64,
    trade_datetime: DateTime<Utc>,
    note: Option<String>,
}

impl From<DbTradeEvent> for TradeEvent {
    fn from(r: DbTradeEvent) -> Self {
        TradeEvent {
            id: r.id,
            account_id: r.account_id,
            symbol: r.asset_name.to_uppercase(),
            kind: TradeKind::parse_lossy(&r.kind),
            quantity: r.qty,
            price_usd: r.price_usd,
            fee_usd: r.fee_usd,
            cash_delta_usd: r.cash_delta_usd,
            executed_at: r.trade_datetime,
            note: r.note,
        }
    }
}

/// A new canonical ledger event, ready to insert.
#[derive(Debug, Clone)]
pub struct NewTradeEvent {
    pub account_id: Uuid,
    pub symbol: String,
    pub kind: TradeKind,
    pub quantity: f64,
    pub price_usd: f64,
    pub fee_usd: f64,
    pub executed_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl NewTradeEvent {
    /// Signed cash movement for this event: sells release cash net of fees,
    /// buys and opening balances consume it.
    pub fn cash_delta_usd(&self) -> f64 {
        match self.kind {
            TradeKind::Sell => self.price_usd * self.quantity - self.fee_usd,
            TradeKind::Buy | TradeKind::Init => -(self.price_usd * self.quantity + self.fee_usd),
        }
    }
}

/// Fields that may change when a user edits a ledger event.
#[derive(Debug, Clone)]
pub struct TradeEventUpdate {
    pub kind: TradeKind,
    pub quantity: f64,
    pub price_usd: f64,
    pub fee_usd: f64,
    pub executed_at: Option<DateTime<Utc>>,
}

/// A legacy-format journal row eligible for migration into the ledger.
#[derive(Debug, Clone, FromRow)]
pub struct DbLegacyEntry {
    pub id: Uuid,
    pub asset_name: String,
    pub side: String,
    pub amount: Option<f64>,
    pub entry_price: Option<f64>,
    pub buy_fee: Option<f64>,
    pub sell_fee: Option<f64>,
    pub trade_datetime: DateTime<Utc>,
    pub notes_entry: Option<String>,
}

/// A persisted exit-strategy configuration row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbExitStrategy {
    pub id: Uuid,
    pub account_id: Uuid,
    pub coin_symbol: String,
    pub is_all_coins: bool,
    pub strategy_type: String,
    pub sell_percent: f64,
    pub gain_percent: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A new exit-strategy configuration, ready to insert.
#[derive(Debug, Clone)]
pub struct NewStrategy {
    pub account_id: Uuid,
    /// Empty-string sentinel when `is_all_coins` is set.
    pub coin_symbol: String,
    pub is_all_coins: bool,
    pub sell_percent: f64,
    pub gain_percent: f64,
}

/// A persisted execution row: one user-confirmed fill against a step.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStrategyExecution {
    pub id: Uuid,
    pub exit_strategy_id: Uuid,
    pub step_gain_percent: f64,
    pub target_price: f64,
    pub executed_price: f64,
    pub quantity_sold: f64,
    pub proceeds: f64,
    pub realized_profit: f64,
    pub executed_at: DateTime<Utc>,
}

/// A new execution row, ready to append.
#[derive(Debug, Clone)]
pub struct NewStrategyExecution {
    pub exit_strategy_id: Uuid,
    pub step_gain_percent: f64,
    pub target_price: f64,
    pub executed_price: f64,
    pub quantity_sold: f64,
    pub proceeds: f64,
    pub realized_profit: f64,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ── Canonical ledger ─────────────────────────────────────────────────

    /// Fetches the full ledger for an account in ascending chronological
    /// order, optionally restricted to one symbol. The CASH pseudo-asset is
    /// always excluded.
    pub async fn list_trade_events(
        &self,
        account_id: Uuid,
        symbol: Option<&str>,
    ) -> Result<Vec<TradeEvent>, DbError> {
        let rows = match symbol {
            Some(sym) => {
                sqlx::query_as::<_, DbTradeEvent>(
                    r#"
                    SELECT id, account_id, asset_name, kind, qty, price_usd, fee_usd,
                           cash_delta_usd, trade_datetime, note
                    FROM portfolio_trades
                    WHERE account_id = $1
                      AND asset_name = $2
                      AND asset_name <> $3
                      AND kind IN ('buy', 'sell', 'init')
                    ORDER BY trade_datetime ASC
                    "#,
                )
                .bind(account_id)
                .bind(sym.trim().to_uppercase())
                .bind(CASH_SYMBOL)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DbTradeEvent>(
                    r#"
                    SELECT id, account_id, asset_name, kind, qty, price_usd, fee_usd,
                           cash_delta_usd, trade_datetime, note
                    FROM portfolio_trades
                    WHERE account_id = $1
                      AND asset_name <> $2
                      AND kind IN ('buy', 'sell', 'init')
                    ORDER BY trade_datetime ASC
                    "#,
                )
                .bind(account_id)
                .bind(CASH_SYMBOL)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(TradeEvent::from).collect())
    }

    /// Fetches the most recent ledger events for an account, newest first,
    /// capped at [`LEDGER_LIST_CAP`] rows. This is the display feed; the
    /// replay path uses [`DbRepository::list_trade_events`] instead, which
    /// is ascending and uncapped.
    pub async fn list_recent_trade_events(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<TradeEvent>, DbError> {
        let rows = sqlx::query_as::<_, DbTradeEvent>(
            r#"
            SELECT id, account_id, asset_name, kind, qty, price_usd, fee_usd,
                   cash_delta_usd, trade_datetime, note
            FROM portfolio_trades
            WHERE account_id = $1
              AND asset_name <> $2
              AND kind IN ('buy', 'sell', 'init')
            ORDER BY trade_datetime DESC
            LIMIT $3
            "#,
        )
        .bind(account_id)
        .bind(CASH_SYMBOL)
        .bind(LEDGER_LIST_CAP)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TradeEvent::from).collect())
    }

    /// Appends a single ledger event and returns its id.
    pub async fn append_trade_event(&self, event: &NewTradeEvent) -> Result<Uuid, DbError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO portfolio_trades
                (account_id, trade_datetime, asset_name, kind, qty, price_usd,
                 fee_usd, cash_delta_usd, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(event.account_id)
        .bind(event.executed_at)
        .bind(event.symbol.trim().to_uppercase())
        .bind(event.kind.as_str())
        .bind(event.quantity)
        .bind(event.price_usd)
        .bind(event.fee_usd)
        .bind(event.cash_delta_usd())
        .bind(event.note.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Bulk-inserts migrated ledger events inside one transaction. Used only
    /// by the legacy migration; a crash mid-batch leaves nothing behind.
    pub async fn insert_trade_events(&self, events: &[NewTradeEvent]) -> Result<u64, DbError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO portfolio_trades
                    (account_id, trade_datetime, asset_name, kind, qty, price_usd,
                     fee_usd, cash_delta_usd, note)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.account_id)
            .bind(event.executed_at)
            .bind(event.symbol.trim().to_uppercase())
            .bind(event.kind.as_str())
            .bind(event.quantity)
            .bind(event.price_usd)
            .bind(event.fee_usd)
            .bind(event.cash_delta_usd())
            .bind(event.note.as_deref())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(events.len() as u64)
    }

    /// Updates a user-editable ledger event. Returns `false` when no row
    /// matched the (id, account) pair.
    pub async fn update_trade_event(
        &self,
        account_id: Uuid,
        trade_id: Uuid,
        update: &TradeEventUpdate,
    ) -> Result<bool, DbError> {
        let cash_delta = match update.kind {
            TradeKind::Sell => update.price_usd * update.quantity - update.fee_usd,
            _ => -(update.price_usd * update.quantity + update.fee_usd),
        };

        let result = sqlx::query(
            r#"
            UPDATE portfolio_trades
            SET kind = $3,
                qty = $4,
                price_usd = $5,
                fee_usd = $6,
                cash_delta_usd = $7,
                trade_datetime = COALESCE($8, trade_datetime)
            WHERE id = $1
              AND account_id = $2
              AND asset_name <> $9
              AND kind IN ('buy', 'sell', 'init')
            "#,
        )
        .bind(trade_id)
        .bind(account_id)
        .bind(update.kind.as_str())
        .bind(update.quantity)
        .bind(update.price_usd)
        .bind(update.fee_usd)
        .bind(cash_delta)
        .bind(update.executed_at)
        .bind(CASH_SYMBOL)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a ledger event. Returns `false` when no row matched.
    pub async fn delete_trade_event(
        &self,
        account_id: Uuid,
        trade_id: Uuid,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM portfolio_trades
            WHERE id = $1
              AND account_id = $2
              AND asset_name <> $3
              AND kind IN ('buy', 'sell', 'init')
            "#,
        )
        .bind(trade_id)
        .bind(account_id)
        .bind(CASH_SYMBOL)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ── Legacy journal (migration source, read-only) ─────────────────────

    /// Scans legacy-format spot trades recognized by their note markers.
    /// These rows are never mutated or deleted by the migration.
    pub async fn list_legacy_portfolio_entries(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<DbLegacyEntry>, DbError> {
        let rows = sqlx::query_as::<_, DbLegacyEntry>(
            r#"
            SELECT id, asset_name, side, amount, entry_price, buy_fee, sell_fee,
                   trade_datetime, notes_entry
            FROM journal_entries
            WHERE account_id = $1
              AND asset_name <> $2
              AND side IN ('buy', 'sell')
              AND is_spot
              AND (notes_entry LIKE '[PORTFOLIO_SPOT_TX]%'
                   OR notes_entry = '[PORTFOLIO_ADD]'
                   OR notes_entry = '[JE:PORTFOLIO]')
            ORDER BY trade_datetime ASC
            "#,
        )
        .bind(account_id)
        .bind(CASH_SYMBOL)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Returns the subset of the given migration markers that already exist
    /// as ledger notes for this account. This is the durable duplicate-insert
    /// guard: migration stays idempotent even across process restarts.
    pub async fn find_existing_migration_notes(
        &self,
        account_id: Uuid,
        notes: &[String],
    ) -> Result<Vec<String>, DbError> {
        if notes.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT note FROM portfolio_trades WHERE account_id = $1 AND note = ANY($2)",
        )
        .bind(account_id)
        .bind(notes)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    // ── Exit strategies ──────────────────────────────────────────────────

    /// Fetches one strategy scoped to its owning account.
    pub async fn get_strategy(
        &self,
        strategy_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<DbExitStrategy>, DbError> {
        let row = sqlx::query_as::<_, DbExitStrategy>(
            r#"
            SELECT id, account_id, coin_symbol, is_all_coins, strategy_type,
                   sell_percent, gain_percent, is_active, created_at
            FROM exit_strategies
            WHERE id = $1 AND account_id = $2
            "#,
        )
        .bind(strategy_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Lists all strategies for an account, newest first.
    pub async fn list_strategies(&self, account_id: Uuid) -> Result<Vec<DbExitStrategy>, DbError> {
        let rows = sqlx::query_as::<_, DbExitStrategy>(
            r#"
            SELECT id, account_id, coin_symbol, is_all_coins, strategy_type,
                   sell_percent, gain_percent, is_active, created_at
            FROM exit_strategies
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Creates a strategy row. A duplicate (account, coin) pair trips the
    /// uniqueness constraint and surfaces as `DbError::Conflict`.
    pub async fn create_strategy(&self, strategy: &NewStrategy) -> Result<Uuid, DbError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO exit_strategies
                (account_id, coin_symbol, is_all_coins, strategy_type,
                 sell_percent, gain_percent, is_active)
            VALUES ($1, $2, $3, 'percentage', $4, $5, TRUE)
            RETURNING id
            "#,
        )
        .bind(strategy.account_id)
        .bind(&strategy.coin_symbol)
        .bind(strategy.is_all_coins)
        .bind(strategy.sell_percent)
        .bind(strategy.gain_percent)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_insert(
                e,
                &format!("exit strategy for {}", display_symbol(&strategy.coin_symbol)),
            )
        })?;

        Ok(row.0)
    }

    /// Deletes a strategy (executions cascade). Returns `false` when no row
    /// matched the (id, account) pair.
    pub async fn delete_strategy(
        &self,
        strategy_id: Uuid,
        account_id: Uuid,
    ) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM exit_strategies WHERE id = $1 AND account_id = $2")
            .bind(strategy_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ── Execution history ────────────────────────────────────────────────

    /// Fetches the execution history for a strategy, ordered by gain step.
    pub async fn list_executions(
        &self,
        strategy_id: Uuid,
    ) -> Result<Vec<DbStrategyExecution>, DbError> {
        let rows = sqlx::query_as::<_, DbStrategyExecution>(
            r#"
            SELECT id, exit_strategy_id, step_gain_percent, target_price,
                   executed_price, quantity_sold, proceeds, realized_profit, executed_at
            FROM exit_strategy_executions
            WHERE exit_strategy_id = $1
            ORDER BY step_gain_percent ASC
            "#,
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Appends one execution row and returns its id.
    pub async fn append_execution(
        &self,
        execution: &NewStrategyExecution,
    ) -> Result<Uuid, DbError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO exit_strategy_executions
                (exit_strategy_id, step_gain_percent, target_price, executed_price,
                 quantity_sold, proceeds, realized_profit)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(execution.exit_strategy_id)
        .bind(execution.step_gain_percent)
        .bind(execution.target_price)
        .bind(execution.executed_price)
        .bind(execution.quantity_sold)
        .bind(execution.proceeds)
        .bind(execution.realized_profit)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

fn display_symbol(coin_symbol: &str) -> &str {
    if coin_symbol.is_empty() {
        "all coins"
    } else {
        coin_symbol
    }
}
