use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use reward_types::{EnrolledPosition, EthAddress, RewardAccrual, User, REWARD_TOKEN_DECIMALS};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::ApiError;
use super::state::ApiState;

fn parse_address(raw: &str) -> Result<EthAddress, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(reward_types::RewardError::MalformedAddress(raw.to_string())))
}

#[derive(Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub address: String,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self { id: u.id, address: u.address.to_hex(), created_at: u.created_at }
    }
}

#[derive(serde::Deserialize)]
pub struct CreateUserRequest {
    pub address: String,
}

/// `POST /users`
pub async fn create_user(
    State(state): State<ApiState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let address = parse_address(&body.address)?;
    let user = state.store.get_or_create_user(&address)?;
    Ok(Json(user.into()))
}

/// `GET /users/{address}`
pub async fn get_user(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let address = parse_address(&address)?;
    let user = state
        .store
        .get_user_by_address(&address)?
        .ok_or_else(|| reward_types::RewardError::NotFound(format!("no such user {}", address.to_hex())))?;
    Ok(Json(user.into()))
}

#[derive(serde::Deserialize)]
pub struct RegisterBulkRequest {
    pub wallet_address: String,
}

#[derive(Serialize)]
pub struct RegisterBulkResponse {
    pub registered_count: u64,
}

/// `POST /positions/register/bulk` — enrolls every position the wallet
/// currently holds on-chain that isn't already registered.
pub async fn register_positions_bulk(
    State(state): State<ApiState>,
    Json(body): Json<RegisterBulkRequest>,
) -> Result<Json<RegisterBulkResponse>, ApiError> {
    let address = parse_address(&body.wallet_address)?;
    let user = state.store.get_or_create_user(&address)?;
    let on_chain = state.chain.positions_of_owner(&address).await?;

    let mut registered_count = 0u64;
    for p in on_chain {
        if state.store.get_position_by_token_id(p.token_id)?.is_some() {
            continue;
        }
        state.store.upsert_position(&EnrolledPosition {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_id: p.token_id,
            tick_lower: p.tick_lower,
            tick_upper: p.tick_upper,
            fee_tier: p.fee_tier,
            token0: p.token0,
            token1: p.token1,
            liquidity_units: p.liquidity,
            current_value_usd: reward_types::TokenAmount::zero(reward_types::USD_DECIMALS),
            is_active: p.liquidity > 0,
            reward_eligible: p.liquidity > 0,
            created_via_app: true,
            created_at: Utc::now(),
        })?;
        registered_count += 1;
    }

    Ok(Json(RegisterBulkResponse { registered_count }))
}

#[derive(Serialize)]
pub struct EligiblePositionsResponse {
    pub eligible_positions: u64,
    pub total_positions: u64,
    pub registered_count: u64,
}

/// `GET /positions/eligible/{address}`
pub async fn eligible_positions(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<EligiblePositionsResponse>, ApiError> {
    let address = parse_address(&address)?;
    let user = state.store.get_or_create_user(&address)?;
    let positions = state.store.get_positions_by_owner(user.id)?;
    let eligible_positions = positions.iter().filter(|p| p.reward_eligible).count() as u64;
    Ok(Json(EligiblePositionsResponse {
        eligible_positions,
        total_positions: positions.len() as u64,
        registered_count: positions.len() as u64,
    }))
}

/// `GET /positions/user/{userId}`
pub async fn positions_for_user(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<EnrolledPosition>>, ApiError> {
    Ok(Json(state.store.get_positions_by_owner(user_id)?))
}

/// `GET /rewards/user/{userId}`
pub async fn rewards_for_user(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<RewardAccrual>>, ApiError> {
    Ok(Json(state.store.accruals_for_user(user_id)?))
}

#[derive(Serialize)]
pub struct RewardStatsResponse {
    pub total_accumulated: String,
    pub total_claimed: String,
    pub total_claimable: String,
    pub active_positions: u64,
    pub avg_daily_rewards: String,
}

/// `GET /rewards/user/{userId}/stats`
pub async fn reward_stats(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RewardStatsResponse>, ApiError> {
    let user = state
        .store
        .get_user_by_id(user_id)?
        .ok_or_else(|| reward_types::RewardError::NotFound("no such user".into()))?;
    let positions = state.store.get_positions_by_owner(user_id)?;

    let mut total_accumulated: u128 = 0;
    for position in &positions {
        total_accumulated += state
            .store
            .cumulative_accrued(position.id, REWARD_TOKEN_DECIMALS)?
            .raw;
    }
    let already_authorized = state.store.sum_cumulative_authorized(&user.address)?;
    let already_claimed_on_chain = state.chain.user_claimed_amount(&user.address).await.unwrap_or(0);
    let total_claimed = already_authorized.max(already_claimed_on_chain);
    let total_claimable = total_accumulated.saturating_sub(total_claimed);
    let active_positions = positions.iter().filter(|p| p.is_active).count() as u64;

    let oldest_days = positions
        .iter()
        .map(|p| p.age_days(Utc::now()))
        .fold(1.0_f64, f64::max);
    let avg_daily_rewards = total_accumulated as f64 / oldest_days;

    Ok(Json(RewardStatsResponse {
        total_accumulated: reward_types::TokenAmount::from_raw(total_accumulated, REWARD_TOKEN_DECIMALS).to_decimal(),
        total_claimed: reward_types::TokenAmount::from_raw(total_claimed, REWARD_TOKEN_DECIMALS).to_decimal(),
        total_claimable: reward_types::TokenAmount::from_raw(total_claimable, REWARD_TOKEN_DECIMALS).to_decimal(),
        active_positions,
        avg_daily_rewards: reward_types::TokenAmount::from_raw(avg_daily_rewards as u128, REWARD_TOKEN_DECIMALS)
            .to_decimal(),
    }))
}

#[derive(Serialize)]
pub struct ClaimableEntry {
    pub position_id: Uuid,
    pub accumulated_units: String,
    pub claimed_units: String,
}

/// `GET /rewards/user/{userId}/claimable` — `claimedUnits` is the user's
/// already-authorized total apportioned across positions by their share of
/// total accumulated units; the contract only tracks claims per user, not
/// per position.
pub async fn claimable_for_user(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ClaimableEntry>>, ApiError> {
    let user = state
        .store
        .get_user_by_id(user_id)?
        .ok_or_else(|| reward_types::RewardError::NotFound("no such user".into()))?;
    let positions = state.store.get_positions_by_owner(user_id)?;

    let mut accumulated = Vec::with_capacity(positions.len());
    let mut total_accumulated: u128 = 0;
    for position in &positions {
        let amount = state.store.cumulative_accrued(position.id, REWARD_TOKEN_DECIMALS)?.raw;
        total_accumulated += amount;
        accumulated.push((position.id, amount));
    }
    let already_authorized = state.store.sum_cumulative_authorized(&user.address)?;
    let already_claimed_on_chain = state.chain.user_claimed_amount(&user.address).await.unwrap_or(0);
    let total_claimed = already_authorized.max(already_claimed_on_chain);

    let entries = accumulated
        .into_iter()
        .map(|(position_id, amount)| {
            let claimed = if total_accumulated > 0 {
                (total_claimed as f64 * (amount as f64 / total_accumulated as f64)) as u128
            } else {
                0
            };
            ClaimableEntry {
                position_id,
                accumulated_units: reward_types::TokenAmount::from_raw(amount, REWARD_TOKEN_DECIMALS).to_decimal(),
                claimed_units: reward_types::TokenAmount::from_raw(claimed, REWARD_TOKEN_DECIMALS).to_decimal(),
            }
        })
        .collect();
    Ok(Json(entries))
}

#[derive(serde::Deserialize)]
pub struct ClaimRequest {
    pub user_address: String,
}

#[derive(Serialize)]
pub struct ClaimResponse {
    pub nonce: u64,
    pub cumulative_authorized: String,
    pub signature: String,
}

/// `POST /rewards/claim/{userId}`
pub async fn claim_rewards(
    State(state): State<ApiState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let user = state
        .store
        .get_user_by_id(user_id)?
        .ok_or_else(|| reward_types::RewardError::NotFound("no such user".into()))?;
    let address = parse_address(&body.user_address)?;
    if address != user.address {
        return Err(ApiError(reward_types::RewardError::MalformedAddress(body.user_address)));
    }

    let grant = state.claims.authorize_claim(address).await?;
    Ok(Json(ClaimResponse {
        nonce: grant.nonce,
        cumulative_authorized: grant.cumulative_authorized_units.to_decimal(),
        signature: grant.signature.to_hex(),
    }))
}

/// `GET /rewards/program-analytics`
pub async fn program_analytics(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let analytics = state.analytics.program_analytics().await?;
    Ok(Json(json!({
        "programAPR": analytics.program_apr,
        "activeLiquidityProviders": analytics.active_liquidity_providers,
        "totalLiquidity": analytics.total_liquidity.to_string(),
        "treasuryTotal": analytics.treasury_total.to_decimal(),
    })))
}

/// `GET /trading-fees/pool-apr`
pub async fn pool_apr(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let apr = state.analytics.trading_fees_apr().await?;
    Ok(Json(json!({ "tradingFeesAPR": apr.trading_fees_apr })))
}

/// `GET /position-lifecycle/status`
pub async fn lifecycle_status(State(state): State<ApiState>) -> Json<Value> {
    let running = state
        .supervisor
        .task_health("lifecycle-reconciler")
        .map(|h| h.state == crate::supervisor::TaskState::Running)
        .unwrap_or(false);
    Json(json!({ "isRunning": running }))
}

/// `POST /position-lifecycle/check-user/{address}` — schedules an
/// out-of-band reconciliation check by re-validating the user's positions
/// against fresh chain state right away, rather than waiting for the next
/// scheduled pass.
pub async fn check_user(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;
    let user = state.store.get_or_create_user(&address)?;
    let positions = state.store.get_positions_by_owner(user.id)?;
    if positions.is_empty() {
        return Ok(Json(json!({ "ok": true })));
    }
    let on_chain = state.chain.positions_of_owner(&address).await?;
    let threshold = state
        .store
        .get_program_settings()?
        .map(|s| s.significance_threshold_usd)
        .unwrap_or(0.0);

    let mut transitions = Vec::new();
    for position in &positions {
        if let Some(p) = on_chain.iter().find(|p| p.token_id == position.token_id) {
            let ctx = reward_types::PositionStateContext {
                token_id: position.token_id,
                has_blockchain_liquidity: p.liquidity > 0,
                blockchain_liquidity: p.liquidity,
                current_value_usd: position.current_value_usd.as_f64(),
                has_unclaimed_tokens: p.has_unclaimed_tokens,
                is_on_blockchain: true,
                significance_threshold_usd: threshold,
            };
            let (state_decision, eligible) = crate::lifecycle::decide(&ctx);
            let is_active = matches!(state_decision, reward_types::PositionState::Active);
            if is_active != position.is_active || eligible != position.reward_eligible {
                transitions.push((position.token_id, is_active, eligible));
            }
        }
    }
    state.store.apply_position_state_transitions(&transitions)?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
