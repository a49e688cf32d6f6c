use crate::address::EthAddress;
use crate::amount::TokenAmount;
use crate::epoch::EpochNumber;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A program participant, created lazily on first interaction. Never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub address: EthAddress,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl User {
    pub fn new(address: EthAddress) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            created_at: chrono::Utc::now(),
        }
    }
}

/// An NFT liquidity position registered with the program.
///
/// `is_active` and `reward_eligible` are derived flags; the Position State
/// Manager (`reward-daemon::lifecycle::decide`) is their only writer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrolledPosition {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_id: u64,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub fee_tier: u32,
    pub token0: EthAddress,
    pub token1: EthAddress,
    pub liquidity_units: u128,
    pub current_value_usd: TokenAmount,
    pub is_active: bool,
    pub reward_eligible: bool,
    pub created_via_app: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl EnrolledPosition {
    /// Age of the position in whole days, used by the time-boost factor.
    pub fn age_days(&self, now: chrono::DateTime<chrono::Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }
}

/// Transient input to the Position State Manager — never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionStateContext {
    pub token_id: u64,
    pub has_blockchain_liquidity: bool,
    pub blockchain_liquidity: u128,
    pub current_value_usd: f64,
    pub has_unclaimed_tokens: bool,
    pub is_on_blockchain: bool,
    pub significance_threshold_usd: f64,
}

/// Target state decided by the Position State Manager for a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Active,
    Inactive,
    NeedsCloseout,
}

/// One epoch's reward distribution to one position. Append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardAccrual {
    pub id: Uuid,
    pub user_id: Uuid,
    pub position_id: Uuid,
    pub epoch_start: chrono::DateTime<chrono::Utc>,
    pub epoch_end: chrono::DateTime<chrono::Utc>,
    pub reward_units: TokenAmount,
    pub accumulated_units: TokenAmount,
    pub formula_inputs: FormulaInputs,
}

/// Verbatim formula inputs captured alongside each accrual for audit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormulaInputs {
    pub share: f64,
    pub time_boost: f64,
    pub in_range_fraction: f64,
    pub full_range_bonus: f64,
    pub normalization_z: f64,
    pub daily_budget: TokenAmount,
}

/// A signed claim authorization, one per `(user, nonce)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimAuthorization {
    pub id: Uuid,
    pub user_address: EthAddress,
    pub nonce: u64,
    pub cumulative_authorized_units: TokenAmount,
    pub signed_at: chrono::DateTime<chrono::Utc>,
    pub signature_digest: [u8; 32],
}

/// Singleton source of truth for the reward formula's program-wide constants.
/// Mutable only via the (out-of-core-scope) admin path; versioned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreasuryConfig {
    pub version: u32,
    pub total_allocation: TokenAmount,
    pub program_start_time: chrono::DateTime<chrono::Utc>,
    pub program_duration_days: u32,
    pub daily_budget: TokenAmount,
    pub reward_contract_address: EthAddress,
    pub token_address: EthAddress,
    /// Reward units carried forward from epochs with no in-range eligible
    /// liquidity (`Z = 0`); added to the next epoch's effective budget.
    pub rollover_bucket: TokenAmount,
}

impl TreasuryConfig {
    pub fn program_end_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.program_start_time + chrono::Duration::days(self.program_duration_days as i64)
    }
}

/// Singleton tuning parameters for the reward formula.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramSettings {
    /// `w1`: time-boost coefficient.
    pub time_boost_coefficient: f64,
    /// Fixed multiplier (> 1) applied to full-range positions.
    pub full_range_bonus: f64,
    /// Multiplier applied when a position is in-range (kept separate from
    /// `full_range_bonus` so whether the two stack or one replaces the other
    /// stays adjustable without touching the formula's call sites).
    pub in_range_multiplier: f64,
    pub significance_threshold_usd: f64,
    pub absolute_max_claim_units: TokenAmount,
}

/// A disagreement between Store state and freshly-fetched chain state,
/// recorded by the Sync Validator. Never auto-deletes; `critical` entries
/// require manual confirmation before any destructive action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncDiscrepancy {
    pub id: Uuid,
    pub token_id: u64,
    pub db_active: bool,
    pub chain_active: bool,
    pub severity: DiscrepancySeverity,
    pub detected_at: chrono::DateTime<chrono::Utc>,
    pub auto_fixed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancySeverity {
    Critical,
    Minor,
}

/// Append-only audit trail of admin-path mutations to `TreasuryConfig` /
/// `ProgramSettings` (the admin path itself is out of core scope; only the
/// record shape lives here).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdminOperation {
    pub id: Uuid,
    pub operation: String,
    pub performed_at: chrono::DateTime<chrono::Utc>,
    pub detail: String,
}

pub const EPOCH_ZERO: EpochNumber = EpochNumber(0);
