use crate::{error::AppError, AppState};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use core_types::TradeKind;
use database::{NewTradeEvent, TradeEventUpdate};
use engine::{CreateStrategyRequest, RecordExecutionRequest, SimulateRequest};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// The requesting account, taken from the `x-account-id` header.
///
/// Session management lives in front of this service; by the time a request
/// arrives here it carries the resolved account id.
#[derive(Debug, Clone, Copy)]
pub struct AccountId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AccountId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-account-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest("missing x-account-id header".to_string()))?;

        let account_id = header
            .parse::<Uuid>()
            .map_err(|_| AppError::BadRequest("x-account-id must be a UUID".to_string()))?;

        Ok(AccountId(account_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl From<Side> for TradeKind {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => TradeKind::Buy,
            Side::Sell => TradeKind::Sell,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionBody {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price_usd: f64,
    #[serde(default)]
    pub fee_usd: f64,
    pub executed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAssetBody {
    pub symbol: String,
    pub amount: f64,
    pub price_usd: f64,
    #[serde(default)]
    pub fee_usd: f64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionBody {
    pub side: Side,
    pub qty: f64,
    pub price_usd: f64,
    #[serde(default)]
    pub fee_usd: f64,
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsQuery {
    pub max_steps: Option<u32>,
}

fn require_positive(name: &str, value: f64) -> Result<(), AppError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "{name} must be strictly positive"
        )))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), AppError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("{name} must be >= 0")))
    }
}

// ── Exit strategies ──────────────────────────────────────────────────────

/// # GET /api/exit-strategies
pub async fn list_exit_strategies(
    AccountId(account_id): AccountId,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.engine.list_strategy_summaries(account_id).await?;
    Ok(Json(json!({ "data": data })))
}

/// # POST /api/exit-strategies
pub async fn create_exit_strategies(
    AccountId(account_id): AccountId,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateStrategyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.engine.create_strategies(account_id, &body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": data }))))
}

/// # GET /api/exit-strategies/:id
pub async fn get_exit_strategy(
    AccountId(account_id): AccountId,
    Path(strategy_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.engine.strategy_summary(account_id, strategy_id).await?;
    Ok(Json(json!({ "data": data })))
}

/// # GET /api/exit-strategies/:id/details
pub async fn get_exit_strategy_details(
    AccountId(account_id): AccountId,
    Path(strategy_id): Path<Uuid>,
    Query(query): Query<DetailsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let data = state
        .engine
        .strategy_details(account_id, strategy_id, query.max_steps)
        .await?;
    Ok(Json(json!({ "data": data })))
}

/// # DELETE /api/exit-strategies/:id
pub async fn delete_exit_strategy(
    AccountId(account_id): AccountId,
    Path(strategy_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.delete_strategy(account_id, strategy_id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// # POST /api/exit-strategies/simulate
pub async fn simulate_exit_strategy(
    AccountId(account_id): AccountId,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SimulateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let results = state.engine.simulate(account_id, &body).await?;
    Ok(Json(json!({ "data": { "results": results } })))
}

/// # POST /api/exit-strategies/:id/executions
pub async fn record_execution(
    AccountId(account_id): AccountId,
    Path(strategy_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecordExecutionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let data = state
        .engine
        .record_execution(account_id, strategy_id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": data }))))
}

// ── Portfolio ────────────────────────────────────────────────────────────

/// # GET /api/portfolio/holdings
pub async fn list_holdings(
    AccountId(account_id): AccountId,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.holdings.all_positions(account_id).await?;
    Ok(Json(json!({ "data": data })))
}

/// # GET /api/portfolio/:symbol
pub async fn get_asset_report(
    AccountId(account_id): AccountId,
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .holdings
        .asset_report(account_id, &symbol, state.resolver.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no ledger history for {symbol}")))?;
    Ok(Json(json!({ "data": report })))
}

/// # GET /api/portfolio/transactions
///
/// The recent-activity feed: newest first, capped at
/// [`database::LEDGER_LIST_CAP`] rows, CASH excluded.
pub async fn list_transactions(
    AccountId(account_id): AccountId,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = state.migrator.migrate(account_id).await {
        tracing::warn!(%account_id, error = %e, "legacy migration failed before listing");
    }

    let data = state.repo.list_recent_trade_events(account_id).await?;
    Ok(Json(json!({ "data": data })))
}

/// # POST /api/portfolio/transactions
pub async fn create_transaction(
    AccountId(account_id): AccountId,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTransactionBody>,
) -> Result<impl IntoResponse, AppError> {
    require_positive("qty", body.qty)?;
    require_positive("priceUsd", body.price_usd)?;
    require_non_negative("feeUsd", body.fee_usd)?;

    let id = state
        .repo
        .append_trade_event(&NewTradeEvent {
            account_id,
            symbol: body.symbol,
            kind: body.side.into(),
            quantity: body.qty,
            price_usd: body.price_usd,
            fee_usd: body.fee_usd,
            executed_at: body.executed_at.unwrap_or_else(Utc::now),
            note: body.note,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "id": id }))))
}

/// # POST /api/portfolio/assets
///
/// Records an opening balance (`init`) for an asset the user already holds.
pub async fn add_asset(
    AccountId(account_id): AccountId,
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddAssetBody>,
) -> Result<impl IntoResponse, AppError> {
    require_positive("amount", body.amount)?;
    require_positive("priceUsd", body.price_usd)?;
    require_non_negative("feeUsd", body.fee_usd)?;

    let id = state
        .repo
        .append_trade_event(&NewTradeEvent {
            account_id,
            symbol: body.symbol,
            kind: TradeKind::Init,
            quantity: body.amount,
            price_usd: body.price_usd,
            fee_usd: body.fee_usd,
            executed_at: body.executed_at,
            note: Some("[PORTFOLIO_INIT]".to_string()),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "id": id }))))
}

/// # PUT /api/portfolio/transactions/:id
pub async fn update_transaction(
    AccountId(account_id): AccountId,
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateTransactionBody>,
) -> Result<impl IntoResponse, AppError> {
    require_positive("qty", body.qty)?;
    require_positive("priceUsd", body.price_usd)?;
    require_non_negative("feeUsd", body.fee_usd)?;

    // Ensure legacy rows are in the ledger before editing against it.
    if let Err(e) = state.migrator.migrate(account_id).await {
        tracing::warn!(%account_id, error = %e, "legacy migration failed before update");
    }

    let found = state
        .repo
        .update_trade_event(
            account_id,
            trade_id,
            &TradeEventUpdate {
                kind: body.side.into(),
                quantity: body.qty,
                price_usd: body.price_usd,
                fee_usd: body.fee_usd,
                executed_at: body.executed_at,
            },
        )
        .await?;

    if !found {
        return Err(AppError::NotFound(format!("transaction {trade_id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

/// # DELETE /api/portfolio/transactions/:id
pub async fn delete_transaction(
    AccountId(account_id): AccountId,
    Path(trade_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = state.migrator.migrate(account_id).await {
        tracing::warn!(%account_id, error = %e, "legacy migration failed before delete");
    }

    let found = state.repo.delete_trade_event(account_id, trade_id).await?;
    if !found {
        return Err(AppError::NotFound(format!("transaction {trade_id}")));
    }
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::TradeEvent;
    use database::LEDGER_LIST_CAP;

    #[test]
    fn transaction_feed_rows_serialize_camel_case() {
        let event = TradeEvent {
            id: Uuid::nil(),
            account_id: Uuid::nil(),
            symbol: "BTC".to_string(),
            kind: TradeKind::Sell,
            quantity: 1.5,
            price_usd: 60_000.0,
            fee_usd: 2.0,
            cash_delta_usd: 89_998.0,
            executed_at: Utc::now(),
            note: None,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "sell");
        assert_eq!(value["priceUsd"], 60_000.0);
        assert_eq!(value["cashDeltaUsd"], 89_998.0);
        assert!(value.get("executedAt").is_some());
    }

    #[test]
    fn transaction_feed_is_capped() {
        assert_eq!(LEDGER_LIST_CAP, 250);
    }
}
