//! APR and program analytics, cached for a short TTL so dashboard traffic
//! never drives extra chain or oracle calls.

use crate::storage::PositionStore;
use parking_lot::Mutex;
use reward_types::{RewardError, RewardResult, TokenAmount, REWARD_TOKEN_DECIMALS};
use std::time::{Duration, Instant};

use crate::oracle::PriceOracleClient;

const CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ProgramAnalytics {
    pub program_apr: f64,
    pub active_liquidity_providers: u64,
    pub total_liquidity: u128,
    pub treasury_total: TokenAmount,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TradingFeesApr {
    pub trading_fees_apr: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct UserApr {
    pub apr: f64,
}

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

pub struct AnalyticsAggregator {
    store: PositionStore,
    oracle: PriceOracleClient,
    program_cache: Mutex<Option<Cached<ProgramAnalytics>>>,
    trading_cache: Mutex<Option<Cached<TradingFeesApr>>>,
}

impl AnalyticsAggregator {
    pub fn new(store: PositionStore, oracle: PriceOracleClient) -> Self {
        Self {
            store,
            oracle,
            program_cache: Mutex::new(None),
            trading_cache: Mutex::new(None),
        }
    }

    /// Program APR: `(dailyBudget · 365 · rewardTokenPriceUSD) / max(SIGNIFICANCE_FLOOR, Σ eligible position USD values)`,
    /// plus the display figures the program-analytics endpoint reports alongside it.
    pub async fn program_analytics(&self) -> RewardResult<ProgramAnalytics> {
        if let Some(cached) = self.program_cache.lock().as_ref() {
            if cached.fetched_at.elapsed() < CACHE_TTL {
                return Ok(cached.value);
            }
        }

        let treasury = self
            .store
            .get_treasury_config()?
            .ok_or_else(|| RewardError::Unavailable("treasury config not initialized".into()))?;
        let settings = self
            .store
            .get_program_settings()?
            .ok_or_else(|| RewardError::Unavailable("program settings not initialized".into()))?;
        let eligible = self.store.list_reward_eligible_positions()?;
        let eligible: Vec<_> = eligible.iter().collect();

        let total_value_usd: f64 = eligible.iter().map(|p| p.current_value_usd.as_f64()).sum();
        let total_liquidity: u128 = eligible.iter().map(|p| p.liquidity_units).sum();

        let quote = self.oracle.quote_usd("native").await?;
        let daily_budget_usd = treasury.daily_budget.as_f64() * quote.price_usd;
        let denominator = total_value_usd.max(settings.significance_threshold_usd);
        let program_apr = (daily_budget_usd * 365.0) / denominator;

        let active_liquidity_providers = self.store.count_users_with_eligible_position()?;

        let result = ProgramAnalytics {
            program_apr,
            active_liquidity_providers,
            total_liquidity,
            treasury_total: treasury.total_allocation,
        };
        *self.program_cache.lock() = Some(Cached { value: result, fetched_at: Instant::now() });
        Ok(result)
    }

    /// Trading APR reads the pool's current state through the Chain Reader;
    /// this daemon has no historical-volume feed, so it reports `0` rather
    /// than fabricate a 24h-volume figure until that data source exists.
    pub async fn trading_fees_apr(&self) -> RewardResult<TradingFeesApr> {
        if let Some(cached) = self.trading_cache.lock().as_ref() {
            if cached.fetched_at.elapsed() < CACHE_TTL {
                return Ok(cached.value);
            }
        }
        let result = TradingFeesApr { trading_fees_apr: 0.0 };
        *self.trading_cache.lock() = Some(Cached { value: result, fetched_at: Instant::now() });
        Ok(result)
    }

    /// Per-user APR: program APR weighted by the user's
    /// `s_u · T_u · IRM_u · FRB_u` — approximated here from the position's
    /// realized accrual rate since it was the Accountant, not this
    /// aggregator, that computed the formula inputs.
    pub async fn user_apr(&self, token_id: u64) -> RewardResult<UserApr> {
        let position = self
            .store
            .get_position_by_token_id(token_id)?
            .ok_or_else(|| RewardError::Unavailable(format!("unknown position {token_id}")))?;
        if position.current_value_usd.as_f64() <= 0.0 {
            return Err(RewardError::Unavailable("position has no priced liquidity".into()));
        }

        let accrued = self.store.cumulative_accrued(position.id, REWARD_TOKEN_DECIMALS)?;
        let quote = self.oracle.quote_usd("native").await?;
        let accrued_usd = accrued.as_f64() * quote.price_usd;
        let age_days = position.age_days(chrono::Utc::now()).max(1.0);

        let apr = (accrued_usd / position.current_value_usd.as_f64()) * (365.0 / age_days);
        Ok(UserApr { apr })
    }
}
