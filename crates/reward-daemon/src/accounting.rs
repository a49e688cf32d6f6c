//! Reward accountant: the daily epoch loop that turns the program's budget
//! into per-position accruals.
//!
//! `R_u = B · s_u · T_u · IRM_u · FRB_u / Z`, where `Z` is the sum of every
//! eligible position's weighted share so the epoch's distribution never
//! exceeds its budget regardless of how many positions are enrolled.

use crate::contracts::ChainReader;
use crate::oracle::PriceOracleClient;
use crate::storage::PositionStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use reward_types::{
    EnrolledPosition, FormulaInputs, ProgramSettings, RewardAccrual, RewardError, RewardResult,
    TokenAmount, TreasuryConfig, REWARD_TOKEN_DECIMALS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Ticks spanning the full range; a position covering them gets the
/// full-range bonus.
const FULL_RANGE_TICK_LOWER: i32 = i32::MIN / 2;
const FULL_RANGE_TICK_UPPER: i32 = i32::MAX / 2;

pub struct RewardAccountant {
    store: PositionStore,
    oracle: PriceOracleClient,
    chain: Arc<ChainReader>,
}

struct Weighted {
    position: EnrolledPosition,
    weight: f64,
    inputs: FormulaInputs,
}

impl RewardAccountant {
    pub fn new(store: PositionStore, oracle: PriceOracleClient, chain: Arc<ChainReader>) -> Self {
        Self { store, oracle, chain }
    }

    /// The daily loop, started with a random 0..=jitter offset so many
    /// deployments don't all hit the RPC endpoint at the same instant.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        epoch_duration: Duration,
        jitter: Duration,
    ) -> RewardResult<()> {
        let jitter_secs = if jitter.as_secs() == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter.as_secs())
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(jitter_secs)) => {}
            _ = shutdown.changed() => return Ok(()),
        }

        let mut ticker = tokio::time::interval(epoch_duration);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_epoch().await {
                        tracing::error!(error = %e, "epoch accrual run failed; epoch will be retried next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run_epoch(&self) -> RewardResult<()> {
        let mut treasury = self
            .store
            .get_treasury_config()?
            .ok_or_else(|| RewardError::Config("treasury config not initialized".into()))?;
        let settings = self
            .store
            .get_program_settings()?
            .ok_or_else(|| RewardError::Config("program settings not initialized".into()))?;

        let now = Utc::now();
        if now >= treasury.program_end_time() {
            tracing::info!("program has ended, skipping epoch accrual");
            return Ok(());
        }

        let quote = self.oracle.quote_usd("native").await?;
        if quote.stale {
            tracing::warn!("price quote stale beyond horizon, deferring epoch accrual to next tick");
            return Err(RewardError::PriceUnavailable);
        }

        let positions = self.store.list_reward_eligible_positions()?;
        let epoch_end = now;
        let epoch_start = epoch_end - ChronoDuration::days(1);
        let current_tick = self.chain.current_tick().await?;

        let weighted = self.weigh_positions(&positions, &settings, &treasury, epoch_start, epoch_end, current_tick);
        let z: f64 = weighted.iter().map(|w| w.weight).sum();

        let effective_budget = treasury
            .daily_budget
            .checked_add(&treasury.rollover_bucket)
            .ok_or_else(|| RewardError::Amount("daily budget + rollover overflow".into()))?;

        if z <= 0.0 {
            tracing::info!("no eligible weighted liquidity this epoch; rolling budget forward");
            treasury.rollover_bucket = effective_budget;
            self.store.save_treasury_config(&treasury)?;
            return Ok(());
        }

        for w in &weighted {
            let reward_fraction = w.weight / z;
            let reward_raw = (effective_budget.raw as f64 * reward_fraction) as u128;
            let reward_units = TokenAmount::from_raw(reward_raw, REWARD_TOKEN_DECIMALS);
            let accumulated = self
                .store
                .cumulative_accrued(w.position.id, REWARD_TOKEN_DECIMALS)?
                .checked_add(&reward_units)
                .ok_or_else(|| RewardError::Amount("accumulated rewards overflow".into()))?;

            self.store.record_accrual(&RewardAccrual {
                id: Uuid::new_v4(),
                user_id: w.position.user_id,
                position_id: w.position.id,
                epoch_start,
                epoch_end,
                reward_units,
                accumulated_units: accumulated,
                formula_inputs: FormulaInputs {
                    daily_budget: effective_budget,
                    normalization_z: z,
                    ..w.inputs
                },
            })?;
        }

        treasury.rollover_bucket = TokenAmount::zero(REWARD_TOKEN_DECIMALS);
        self.store.save_treasury_config(&treasury)?;
        tracing::info!(positions = weighted.len(), "epoch accrual committed");
        Ok(())
    }

    fn weigh_positions(
        &self,
        positions: &[EnrolledPosition],
        settings: &ProgramSettings,
        treasury: &TreasuryConfig,
        epoch_start: DateTime<Utc>,
        epoch_end: DateTime<Utc>,
        current_tick: i32,
    ) -> Vec<Weighted> {
        let program_duration_days = treasury.program_duration_days.max(1) as f64;

        // `L_u` is the position's liquidity-time integral over the epoch: its
        // raw liquidity scaled by the fraction of the epoch it was actually
        // enrolled, so a position created mid-epoch contributes proportionally.
        let effective_liquidity: Vec<(f64, f64)> = positions
            .iter()
            .filter(|p| p.reward_eligible)
            .map(|p| {
                let proration = proration_fraction(p.created_at, epoch_start, epoch_end);
                (p.liquidity_units as f64 * proration, proration)
            })
            .collect();
        let total_liquidity: f64 = effective_liquidity.iter().map(|(l, _)| l).sum();

        positions
            .iter()
            .filter(|p| p.reward_eligible)
            .zip(effective_liquidity)
            .map(|(position, (effective_l, proration))| {
                let share = if total_liquidity > 0.0 { effective_l / total_liquidity } else { 0.0 };
                let age_fraction = (position.age_days(epoch_end) / program_duration_days).min(1.0);
                let time_boost = 1.0 + settings.time_boost_coefficient * age_fraction;
                let is_full_range =
                    position.tick_lower <= FULL_RANGE_TICK_LOWER && position.tick_upper >= FULL_RANGE_TICK_UPPER;
                let full_range_bonus = if is_full_range { settings.full_range_bonus } else { 1.0 };
                // Snapshot-based in-range fraction: whether the pool's current
                // tick falls in the position's range at epoch close. A full
                // time-integral would need tick-crossing history the pool
                // doesn't expose through the read-only interface this reads.
                let in_range_fraction = if position.tick_lower <= current_tick && current_tick < position.tick_upper {
                    1.0
                } else {
                    0.0
                };
                let weight = share * time_boost * settings.in_range_multiplier * full_range_bonus * in_range_fraction;
                Weighted {
                    position: position.clone(),
                    weight,
                    inputs: FormulaInputs {
                        share,
                        time_boost,
                        in_range_fraction,
                        full_range_bonus,
                        normalization_z: 0.0,
                        daily_budget: TokenAmount::zero(REWARD_TOKEN_DECIMALS),
                    },
                }
            })
            .collect()
    }
}

/// Fraction of the epoch the position was actually enrolled for, so a
/// position created mid-epoch only accrues for the time it held liquidity.
fn proration_fraction(
    created_at: DateTime<Utc>,
    epoch_start: DateTime<Utc>,
    epoch_end: DateTime<Utc>,
) -> f64 {
    let effective_start = created_at.max(epoch_start);
    if effective_start >= epoch_end {
        return 0.0;
    }
    let epoch_len = (epoch_end - epoch_start).num_seconds().max(1) as f64;
    let active_len = (epoch_end - effective_start).num_seconds().max(0) as f64;
    (active_len / epoch_len).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reward_types::EthAddress;

    fn base_position(id: u64, liquidity: u128, created_at: DateTime<Utc>) -> EnrolledPosition {
        EnrolledPosition {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_id: id,
            tick_lower: -100,
            tick_upper: 100,
            fee_tier: 3000,
            token0: EthAddress::from_bytes([1u8; 20]),
            token1: EthAddress::from_bytes([2u8; 20]),
            liquidity_units: liquidity,
            current_value_usd: TokenAmount::zero(reward_types::USD_DECIMALS),
            is_active: true,
            reward_eligible: true,
            created_via_app: true,
            created_at,
        }
    }

    fn settings(time_boost_coefficient: f64, full_range_bonus: f64) -> ProgramSettings {
        ProgramSettings {
            time_boost_coefficient,
            full_range_bonus,
            in_range_multiplier: 1.0,
            significance_threshold_usd: 0.0,
            absolute_max_claim_units: TokenAmount::zero(REWARD_TOKEN_DECIMALS),
        }
    }

    fn treasury(program_duration_days: u32) -> TreasuryConfig {
        TreasuryConfig {
            version: 1,
            total_allocation: TokenAmount::zero(REWARD_TOKEN_DECIMALS),
            program_start_time: Utc::now() - ChronoDuration::days(program_duration_days as i64),
            program_duration_days,
            daily_budget: TokenAmount::from_raw(5000, REWARD_TOKEN_DECIMALS),
            reward_contract_address: EthAddress::from_bytes([3u8; 20]),
            token_address: EthAddress::from_bytes([4u8; 20]),
            rollover_bucket: TokenAmount::zero(REWARD_TOKEN_DECIMALS),
        }
    }

    fn accountant_for_weighing() -> RewardAccountant {
        RewardAccountant {
            store: PositionStore::open_in_memory().unwrap(),
            oracle: PriceOracleClient::new(&crate::config::OracleConfig {
                endpoint: "http://127.0.0.1:1/quote".into(),
                cache_ttl_secs: 60,
                stale_after_secs: 600,
            })
            .unwrap(),
            chain: Arc::new(ChainReader::new(&crate::config::ChainConfig::default()).unwrap()),
        }
    }

    #[test]
    fn weigh_positions_applies_share_time_boost_in_range_and_full_range_bonus() {
        let accountant = accountant_for_weighing();
        let epoch_end = Utc::now();
        let epoch_start = epoch_end - ChronoDuration::days(1);
        let long_ago = epoch_start - ChronoDuration::days(365);

        let full_range = EnrolledPosition {
            tick_lower: FULL_RANGE_TICK_LOWER,
            tick_upper: FULL_RANGE_TICK_UPPER,
            ..base_position(1, 1_000, long_ago)
        };
        let narrow_out_of_range = EnrolledPosition { tick_lower: 500, tick_upper: 600, ..base_position(2, 1_000, long_ago) };

        let settings = settings(0.0, 1.2);
        let treasury = treasury(100);
        let weighted = accountant.weigh_positions(
            &[full_range.clone(), narrow_out_of_range.clone()],
            &settings,
            &treasury,
            epoch_start,
            epoch_end,
            550, // current tick: inside narrow_out_of_range's range, inside full_range's range too
        );

        let full_range_w = weighted.iter().find(|w| w.position.token_id == 1).unwrap();
        let narrow_w = weighted.iter().find(|w| w.position.token_id == 2).unwrap();

        assert_eq!(full_range_w.inputs.share, 0.5);
        assert_eq!(full_range_w.inputs.full_range_bonus, 1.2);
        assert_eq!(full_range_w.inputs.in_range_fraction, 1.0);
        assert_eq!(narrow_w.inputs.full_range_bonus, 1.0);
        assert_eq!(narrow_w.inputs.in_range_fraction, 1.0);
        assert!(full_range_w.weight > narrow_w.weight);
    }

    #[test]
    fn weigh_positions_reproduces_two_position_budget_split() {
        let accountant = accountant_for_weighing();
        let epoch_end = Utc::now();
        let epoch_start = epoch_end - ChronoDuration::days(1);

        // `program_duration_days` is large enough that B's one-day-old
        // enrollment contributes a negligible age fraction, matching the
        // `D_B/P = 0` scenario; A is enrolled for the program's full span.
        let program_duration_days = 100_000u32;
        let position_a = base_position(1, 1_000, epoch_start - ChronoDuration::days(program_duration_days as i64));
        let position_b = base_position(2, 1_000, epoch_start - ChronoDuration::days(1));

        let settings = settings(0.6, 1.2);
        let treasury = treasury(program_duration_days);
        let weighted =
            accountant.weigh_positions(&[position_a, position_b], &settings, &treasury, epoch_start, epoch_end, 0);

        let z: f64 = weighted.iter().map(|w| w.weight).sum();
        let budget = 5000.0;
        let r_a = budget * weighted[0].weight / z;
        let r_b = budget * weighted[1].weight / z;

        assert!((z - 1.3).abs() < 1e-3);
        assert!((r_a - 3076.92).abs() < 1.0);
        assert!((r_b - 1923.08).abs() < 1.0);
        assert!((r_a + r_b - budget).abs() < 1e-6);
    }

    #[test]
    fn full_epoch_enrollment_gets_full_proration() {
        let start = Utc::now() - ChronoDuration::days(1);
        let end = Utc::now();
        let fraction = proration_fraction(start - ChronoDuration::days(5), start, end);
        assert!((fraction - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mid_epoch_enrollment_is_prorated() {
        let start = Utc::now() - ChronoDuration::hours(24);
        let end = Utc::now();
        let created = start + ChronoDuration::hours(12);
        let fraction = proration_fraction(created, start, end);
        assert!((fraction - 0.5).abs() < 0.05);
    }

    #[test]
    fn enrollment_after_epoch_end_gets_zero() {
        let start = Utc::now() - ChronoDuration::hours(24);
        let end = Utc::now();
        let fraction = proration_fraction(end + ChronoDuration::hours(1), start, end);
        assert_eq!(fraction, 0.0);
    }
}
