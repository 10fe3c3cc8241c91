//! # Summit Engine Crate
//!
//! The exit-strategy engine: given a derived position and a percentage
//! sell-on-gain policy, it computes the next unexecuted step, the full
//! projected liquidation schedule (historical fills stitched with forward
//! simulation), a stateless what-if simulator, and records confirmed fills.
//!
//! All outputs are derived fresh on every request; nothing here is cached
//! or persisted except the append-only execution history.

use core_types::{round_dp, StepStatus};
use database::{DbExitStrategy, DbRepository, NewStrategy, NewStrategyExecution};
use futures::future::join_all;
use portfolio::HoldingsService;
use pricing::PriceResolver;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

pub mod error;
pub mod plan;
pub mod report;

pub use error::EngineError;
pub use plan::{DEFAULT_MAX_STEPS, MAX_STEP_SCAN};
pub use report::{AssetSummary, ScaleOutStep, SimulatedAsset, StrategyDetails, StrategySummary};

use plan::ExecutionFill;

/// Request body for creating strategies: either one all-coins strategy or
/// one strategy per listed coin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStrategyRequest {
    pub all_coins: bool,
    #[serde(default)]
    pub coin_symbols: Vec<String>,
    pub sell_percent: f64,
    pub gain_percent: f64,
}

/// Request body for the stateless simulator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub all_coins: bool,
    #[serde(default)]
    pub coin_symbols: Vec<String>,
    pub sell_percent: f64,
    pub gain_percent: f64,
    pub max_steps: Option<u32>,
}

/// Request body for recording a confirmed fill against a step.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordExecutionRequest {
    /// Required when the strategy is all-coins, ignored otherwise.
    pub coin_symbol: Option<String>,
    pub step_gain_percent: f64,
    pub target_price_usd: f64,
    pub executed_price_usd: f64,
    pub quantity_sold: f64,
}

/// The exit-strategy engine. Stateless per request: every operation reads
/// the strategy store, replays holdings and resolves prices fresh.
#[derive(Clone)]
pub struct ExitEngine {
    repo: DbRepository,
    holdings: HoldingsService,
    resolver: Arc<dyn PriceResolver>,
}

impl ExitEngine {
    pub fn new(
        repo: DbRepository,
        holdings: HoldingsService,
        resolver: Arc<dyn PriceResolver>,
    ) -> Self {
        Self {
            repo,
            holdings,
            resolver,
        }
    }

    // ── Strategy store operations ────────────────────────────────────────

    /// Creates strategies from one request and returns their summaries.
    /// A duplicate (account, coin) pair surfaces as `DbError::Conflict`.
    pub async fn create_strategies(
        &self,
        account_id: Uuid,
        request: &CreateStrategyRequest,
    ) -> Result<Vec<StrategySummary>, EngineError> {
        validate_percent_bounds(request.sell_percent, request.gain_percent)?;

        let new_rows: Vec<NewStrategy> = if request.all_coins {
            vec![NewStrategy {
                account_id,
                coin_symbol: String::new(),
                is_all_coins: true,
                sell_percent: request.sell_percent,
                gain_percent: request.gain_percent,
            }]
        } else {
            if request.coin_symbols.is_empty() {
                return Err(EngineError::Validation(
                    "coinSymbols must not be empty for a per-coin strategy".to_string(),
                ));
            }
            request
                .coin_symbols
                .iter()
                .map(|c| NewStrategy {
                    account_id,
                    coin_symbol: c.trim().to_uppercase(),
                    is_all_coins: false,
                    sell_percent: request.sell_percent,
                    gain_percent: request.gain_percent,
                })
                .collect()
        };

        let mut summaries = Vec::with_capacity(new_rows.len());
        for row in &new_rows {
            let id = self.repo.create_strategy(row).await?;
            summaries.push(self.strategy_summary(account_id, id).await?);
        }
        Ok(summaries)
    }

    /// Deletes a strategy; its execution history cascades away with it.
    pub async fn delete_strategy(
        &self,
        account_id: Uuid,
        strategy_id: Uuid,
    ) -> Result<(), EngineError> {
        if self.repo.delete_strategy(strategy_id, account_id).await? {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("exit strategy {strategy_id}")))
        }
    }

    // ── Summaries ────────────────────────────────────────────────────────

    /// Summaries for every strategy of an account, newest first.
    pub async fn list_strategy_summaries(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<StrategySummary>, EngineError> {
        let strategies = self.repo.list_strategies(account_id).await?;
        let mut summaries = Vec::with_capacity(strategies.len());
        for strategy in &strategies {
            summaries.push(self.summary_for_config(account_id, strategy).await?);
        }
        Ok(summaries)
    }

    /// The summary of one strategy. `NotFound` when no row matches the
    /// (strategy, account) pair.
    pub async fn strategy_summary(
        &self,
        account_id: Uuid,
        strategy_id: Uuid,
    ) -> Result<StrategySummary, EngineError> {
        let strategy = self.require_strategy(account_id, strategy_id).await?;
        self.summary_for_config(account_id, &strategy).await
    }

    /// The detail view: summary plus stitched schedule per resolved asset.
    pub async fn strategy_details(
        &self,
        account_id: Uuid,
        strategy_id: Uuid,
        max_steps: Option<u32>,
    ) -> Result<StrategyDetails, EngineError> {
        let max_steps = validate_max_steps(max_steps)?;
        let strategy = self.require_strategy(account_id, strategy_id).await?;
        let summary = self.summary_for_config(account_id, &strategy).await?;

        let executions = self.execution_fills(strategy_id).await?;

        let mut rows_by_coin = BTreeMap::new();
        for asset in &summary.assets {
            let position = self.holdings.position(account_id, &asset.coin_symbol).await?;
            let (qty_open, entry_price) = position
                .map(|p| (p.quantity, p.avg_entry_price_usd))
                .unwrap_or((0.0, 0.0));

            let rows = plan::build_schedule(
                qty_open,
                entry_price,
                strategy.sell_percent,
                strategy.gain_percent,
                max_steps,
                &executions,
            );
            rows_by_coin.insert(asset.coin_symbol.clone(), rows);
        }

        Ok(StrategyDetails {
            summary,
            rows_by_coin,
        })
    }

    // ── Stateless simulator ──────────────────────────────────────────────

    /// Previews scale-out schedules without touching any persisted strategy
    /// or execution history. Symbols with no open position are simulated as
    /// empty positions rather than rejected.
    pub async fn simulate(
        &self,
        account_id: Uuid,
        request: &SimulateRequest,
    ) -> Result<Vec<SimulatedAsset>, EngineError> {
        validate_percent_bounds(request.sell_percent, request.gain_percent)?;
        let max_steps = validate_max_steps(request.max_steps)?;

        let holdings = if request.all_coins {
            self.holdings.all_positions(account_id).await?
        } else {
            if request.coin_symbols.is_empty() {
                return Err(EngineError::Validation(
                    "coinSymbols must not be empty when allCoins is false".to_string(),
                ));
            }
            let mut resolved = Vec::with_capacity(request.coin_symbols.len());
            for coin in &request.coin_symbols {
                let symbol = coin.trim().to_uppercase();
                let position = self.holdings.position(account_id, &symbol).await?;
                resolved.push(position.unwrap_or(core_types::Position {
                    symbol,
                    quantity: 0.0,
                    invested_usd: 0.0,
                    avg_entry_price_usd: 0.0,
                }));
            }
            resolved
        };

        Ok(holdings
            .into_iter()
            .map(|h| SimulatedAsset {
                coin_symbol: h.symbol.clone(),
                qty_open: round_dp(h.quantity, 8),
                entry_price_usd: round_dp(h.avg_entry_price_usd, 8),
                rows: plan::simulate_schedule(
                    h.quantity,
                    h.avg_entry_price_usd,
                    request.sell_percent,
                    request.gain_percent,
                    max_steps,
                ),
            })
            .collect())
    }

    // ── Execution recorder ───────────────────────────────────────────────

    /// Records one user-confirmed fill and returns the refreshed details.
    ///
    /// Realized profit is computed against the *current* weighted-average
    /// cost at recording time, since the basis can drift between a step
    /// becoming ready and the user confirming the fill.
    pub async fn record_execution(
        &self,
        account_id: Uuid,
        strategy_id: Uuid,
        request: &RecordExecutionRequest,
    ) -> Result<StrategyDetails, EngineError> {
        for (name, value) in [
            ("stepGainPercent", request.step_gain_percent),
            ("targetPriceUsd", request.target_price_usd),
            ("executedPriceUsd", request.executed_price_usd),
            ("quantitySold", request.quantity_sold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::Validation(format!(
                    "{name} must be strictly positive"
                )));
            }
        }

        let strategy = self.require_strategy(account_id, strategy_id).await?;

        let coin = if strategy.is_all_coins {
            request
                .coin_symbol
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_uppercase)
                .ok_or_else(|| {
                    EngineError::Validation(
                        "coinSymbol is required for all-coins strategies".to_string(),
                    )
                })?
        } else {
            strategy.coin_symbol.to_uppercase()
        };

        let entry_price_usd = self
            .holdings
            .position(account_id, &coin)
            .await?
            .map(|p| p.avg_entry_price_usd)
            .unwrap_or(0.0);

        let proceeds = request.quantity_sold * request.executed_price_usd;
        let realized_profit =
            request.quantity_sold * (request.executed_price_usd - entry_price_usd);

        self.repo
            .append_execution(&NewStrategyExecution {
                exit_strategy_id: strategy_id,
                step_gain_percent: request.step_gain_percent,
                target_price: request.target_price_usd,
                executed_price: request.executed_price_usd,
                quantity_sold: request.quantity_sold,
                proceeds,
                realized_profit,
            })
            .await?;

        tracing::info!(
            %strategy_id,
            %coin,
            gain = request.step_gain_percent,
            qty = request.quantity_sold,
            realized_profit,
            "recorded exit-strategy execution"
        );

        // Full recomputation, not an incremental patch.
        self.strategy_details(account_id, strategy_id, None).await
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn require_strategy(
        &self,
        account_id: Uuid,
        strategy_id: Uuid,
    ) -> Result<DbExitStrategy, EngineError> {
        self.repo
            .get_strategy(strategy_id, account_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("exit strategy {strategy_id}")))
    }

    /// Loads the execution history keyed by rounded gain level.
    async fn execution_fills(
        &self,
        strategy_id: Uuid,
    ) -> Result<HashMap<i64, ExecutionFill>, EngineError> {
        let executions = self.repo.list_executions(strategy_id).await?;
        Ok(executions
            .iter()
            .map(|e| {
                (
                    plan::gain_key(e.step_gain_percent),
                    ExecutionFill {
                        executed_price: e.executed_price,
                        quantity_sold: e.quantity_sold,
                        proceeds: e.proceeds,
                        realized_profit: e.realized_profit,
                    },
                )
            })
            .collect())
    }

    async fn summary_for_config(
        &self,
        account_id: Uuid,
        strategy: &DbExitStrategy,
    ) -> Result<StrategySummary, EngineError> {
        // Resolve which coins this strategy applies to. All-coins strategies
        // re-resolve against current holdings on every read.
        let coins: Vec<String> = if strategy.is_all_coins {
            self.holdings
                .all_positions(account_id)
                .await?
                .into_iter()
                .map(|p| p.symbol)
                .collect()
        } else {
            vec![strategy.coin_symbol.to_uppercase()]
        };

        let assets: Vec<AssetSummary> = join_all(coins.iter().map(|coin| {
            self.asset_summary(
                account_id,
                strategy.id,
                coin,
                strategy.sell_percent,
                strategy.gain_percent,
            )
        }))
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

        let total_profit_usd = assets
            .iter()
            .filter(|a| a.status == StepStatus::Ready)
            .map(|a| a.usd_value_to_sell)
            .sum::<f64>();

        Ok(StrategySummary {
            id: strategy.id,
            is_all_coins: strategy.is_all_coins,
            coin_symbols: coins,
            strategy_type: strategy.strategy_type.clone(),
            sell_percent: strategy.sell_percent,
            gain_percent: strategy.gain_percent,
            is_active: strategy.is_active,
            total_assets: assets.len(),
            assets,
            total_profit_usd: round_dp(total_profit_usd, 2),
        })
    }

    async fn asset_summary(
        &self,
        account_id: Uuid,
        strategy_id: Uuid,
        coin: &str,
        sell_percent: f64,
        gain_percent: f64,
    ) -> Result<AssetSummary, EngineError> {
        let position = self.holdings.position(account_id, coin).await?;
        let (qty_open, entry_price_usd) = position
            .map(|p| (p.quantity, p.avg_entry_price_usd))
            .unwrap_or((0.0, 0.0));

        let executions = self.execution_fills(strategy_id).await?;
        let next_gain = plan::next_unexecuted_gain(gain_percent, &executions);

        let quote = self
            .resolver
            .resolve(account_id, coin, entry_price_usd)
            .await;

        Ok(plan::summarize_asset(
            coin,
            qty_open,
            entry_price_usd,
            sell_percent,
            next_gain,
            quote,
        ))
    }
}

/// Shared validation for strategy parameters: sellPercent in (0, 100],
/// gainPercent in (0, 10000]. Rejected before any computation.
fn validate_percent_bounds(sell_percent: f64, gain_percent: f64) -> Result<(), EngineError> {
    if !sell_percent.is_finite() || sell_percent <= 0.0 || sell_percent > 100.0 {
        return Err(EngineError::Validation(
            "sellPercent must be in (0, 100]".to_string(),
        ));
    }
    if !gain_percent.is_finite() || gain_percent <= 0.0 || gain_percent > 10_000.0 {
        return Err(EngineError::Validation(
            "gainPercent must be in (0, 10000]".to_string(),
        ));
    }
    Ok(())
}

/// maxSteps defaults to 10 and is capped at the ladder scan limit.
fn validate_max_steps(max_steps: Option<u32>) -> Result<u32, EngineError> {
    match max_steps {
        None => Ok(DEFAULT_MAX_STEPS),
        Some(n) if (1..=MAX_STEP_SCAN).contains(&n) => Ok(n),
        Some(n) => Err(EngineError::Validation(format!(
            "maxSteps must be in 1..={MAX_STEP_SCAN}, got {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_bounds_are_half_open() {
        assert!(validate_percent_bounds(100.0, 10_000.0).is_ok());
        assert!(validate_percent_bounds(0.01, 0.01).is_ok());
        assert!(validate_percent_bounds(0.0, 30.0).is_err());
        assert!(validate_percent_bounds(100.1, 30.0).is_err());
        assert!(validate_percent_bounds(25.0, 0.0).is_err());
        assert!(validate_percent_bounds(25.0, 10_000.5).is_err());
        assert!(validate_percent_bounds(f64::NAN, 30.0).is_err());
    }

    #[test]
    fn max_steps_defaults_and_bounds() {
        assert_eq!(validate_max_steps(None).unwrap(), 10);
        assert_eq!(validate_max_steps(Some(1)).unwrap(), 1);
        assert_eq!(validate_max_steps(Some(50)).unwrap(), 50);
        assert!(validate_max_steps(Some(0)).is_err());
        assert!(validate_max_steps(Some(51)).is_err());
    }
}
