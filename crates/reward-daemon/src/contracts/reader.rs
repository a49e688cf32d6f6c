//! The chain reader: the only component that talks to the EVM RPC endpoint.
//! Every call goes through a bounded exponential-backoff retry budget so
//! that a single RPC hiccup never surfaces past this module as anything
//! other than a classified [`RewardError`].

use crate::config::ChainConfig;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use ethers::prelude::*;
use reward_types::{EthAddress, RewardError, RewardResult};
use std::sync::Arc;
use std::time::Duration;

use super::bindings::{LiquidityPool, PositionNft, RewardToken, RewardTreasury};

/// The pool's full on-chain state, as `fetchPoolState()` specifies it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolState {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OnChainPosition {
    pub token_id: u64,
    pub owner: EthAddress,
    pub token0: EthAddress,
    pub token1: EthAddress,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub fee_tier: u32,
    pub liquidity: u128,
    pub has_unclaimed_tokens: bool,
}

pub struct ChainReader {
    provider: Arc<Provider<Http>>,
    position_nft: PositionNft<Provider<Http>>,
    pool: LiquidityPool<Provider<Http>>,
    treasury: RewardTreasury<Provider<Http>>,
    reward_token: RewardToken<Provider<Http>>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ChainReader {
    pub fn new(config: &ChainConfig) -> RewardResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| RewardError::Config(format!("invalid chain rpc_url: {e}")))?;
        let provider = Arc::new(provider);

        let position_nft_addr: Address = config
            .position_nft_address
            .parse()
            .map_err(|e| RewardError::Config(format!("invalid position_nft_address: {e}")))?;
        let pool_addr: Address = config
            .pool_address
            .parse()
            .map_err(|e| RewardError::Config(format!("invalid pool_address: {e}")))?;
        let treasury_addr: Address = config
            .treasury_contract_address
            .parse()
            .map_err(|e| RewardError::Config(format!("invalid treasury_contract_address: {e}")))?;
        let reward_token_addr: Address = config
            .reward_token_address
            .parse()
            .map_err(|e| RewardError::Config(format!("invalid reward_token_address: {e}")))?;

        Ok(Self {
            position_nft: PositionNft::new(position_nft_addr, provider.clone()),
            pool: LiquidityPool::new(pool_addr, provider.clone()),
            treasury: RewardTreasury::new(treasury_addr, provider.clone()),
            reward_token: RewardToken::new(reward_token_addr, provider.clone()),
            provider,
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        })
    }

    fn backoff_policy(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(Some(self.max_delay * self.max_retries))
            .build()
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> RewardResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = RewardResult<T>>,
    {
        let policy = self.backoff_policy();
        retry(policy, || async {
            op().await.map_err(|e| {
                if e.is_transient() {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
        .map_err(|e| match e {
            backoff::Error::Permanent(inner) => inner,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    pub async fn block_number(&self) -> RewardResult<u64> {
        self.with_retry(|| async {
            self.provider
                .get_block_number()
                .await
                .map(|n| n.as_u64())
                .map_err(|e| RewardError::Transient(e.to_string()))
        })
        .await
    }

    pub async fn position(&self, token_id: u64) -> RewardResult<OnChainPosition> {
        self.with_retry(|| async {
            let owner = self
                .position_nft
                .owner_of(U256::from(token_id))
                .call()
                .await
                .map_err(classify_contract_error)?;
            let p = self
                .position_nft
                .positions(U256::from(token_id))
                .call()
                .await
                .map_err(classify_contract_error)?;
            Ok(OnChainPosition {
                token_id,
                owner: EthAddress::from_bytes(owner.0),
                token0: EthAddress::from_bytes(p.2.0),
                token1: EthAddress::from_bytes(p.3.0),
                tick_lower: p.5,
                tick_upper: p.6,
                fee_tier: p.4,
                liquidity: p.7,
                has_unclaimed_tokens: p.10 > 0 || p.11 > 0,
            })
        })
        .await
    }

    /// Enumerates every position token `owner` currently holds via
    /// `ERC721Enumerable`, fetching each position's detail. A `NotFound`
    /// (owner holds zero tokens) is not an error — it's an empty vec.
    pub async fn positions_of_owner(&self, owner: &EthAddress) -> RewardResult<Vec<OnChainPosition>> {
        let owner_addr = Address::from(*owner.as_bytes());
        let balance = self
            .with_retry(|| async {
                self.position_nft
                    .balance_of(owner_addr)
                    .call()
                    .await
                    .map_err(classify_contract_error)
            })
            .await?;

        let mut positions = Vec::with_capacity(balance.as_usize());
        for index in 0..balance.as_u64() {
            let token_id = self
                .with_retry(|| async {
                    self.position_nft
                        .token_of_owner_by_index(owner_addr, U256::from(index))
                        .call()
                        .await
                        .map_err(classify_contract_error)
                })
                .await?
                .as_u64();
            positions.push(self.position(token_id).await?);
        }
        Ok(positions)
    }

    /// Full pool state: `slot0`'s price/tick plus the pool's total liquidity.
    pub async fn pool_state(&self) -> RewardResult<PoolState> {
        self.with_retry(|| async {
            let slot0 = self.pool.slot_0().call().await.map_err(classify_contract_error)?;
            let liquidity = self.pool.liquidity().call().await.map_err(classify_contract_error)?;
            Ok(PoolState {
                sqrt_price_x96: slot0.0,
                tick: slot0.1,
                liquidity,
            })
        })
        .await
    }

    pub async fn current_tick(&self) -> RewardResult<i32> {
        Ok(self.pool_state().await?.tick)
    }

    /// The reward token's ERC20 balance for `owner` — used to confirm the
    /// treasury actually holds enough to cover what it has authorized.
    pub async fn token_balance(&self, owner: &EthAddress) -> RewardResult<u128> {
        self.with_retry(|| async {
            let balance = self
                .reward_token
                .balance_of(Address::from(*owner.as_bytes()))
                .call()
                .await
                .map_err(classify_contract_error)?;
            Ok(balance.as_u128())
        })
        .await
    }

    pub async fn user_nonce(&self, user: &EthAddress) -> RewardResult<u64> {
        self.with_retry(|| async {
            let n = self
                .treasury
                .user_nonce(Address::from(*user.as_bytes()))
                .call()
                .await
                .map_err(classify_contract_error)?;
            Ok(n.as_u64())
        })
        .await
    }

    pub async fn user_claimed_amount(&self, user: &EthAddress) -> RewardResult<u128> {
        self.with_retry(|| async {
            let n = self
                .treasury
                .user_claimed_amount(Address::from(*user.as_bytes()))
                .call()
                .await
                .map_err(classify_contract_error)?;
            Ok(n.as_u128())
        })
        .await
    }

    pub async fn is_authorized_signer(&self, signer: &EthAddress) -> RewardResult<bool> {
        self.with_retry(|| async {
            self.treasury
                .is_authorized_signer(Address::from(*signer.as_bytes()))
                .call()
                .await
                .map_err(classify_contract_error)
        })
        .await
    }
}

/// RPC timeouts and connection resets are transient; a revert or malformed
/// call is not — retrying it would just burn the budget on a call that can
/// never succeed.
fn classify_contract_error<M: std::fmt::Display>(err: M) -> RewardError {
    let message = err.to_string();
    if message.contains("timed out")
        || message.contains("connection")
        || message.contains("reset")
        || message.contains("429")
    {
        RewardError::Transient(message)
    } else {
        RewardError::Chain(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> ChainReader {
        ChainReader::new(&ChainConfig {
            rpc_url: "http://localhost:8545".into(),
            chain_id: 1,
            position_nft_address: "0x0000000000000000000000000000000000000001".into(),
            pool_address: "0x0000000000000000000000000000000000000002".into(),
            reward_token_address: "0x0000000000000000000000000000000000000004".into(),
            treasury_contract_address: "0x0000000000000000000000000000000000000003".into(),
            max_retries: 1,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 1,
        })
        .unwrap()
    }

    #[test]
    fn construction_rejects_malformed_addresses() {
        let err = ChainReader::new(&ChainConfig {
            position_nft_address: "not-an-address".into(),
            ..ChainConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, RewardError::Config(_)));
    }

    #[test]
    fn construction_succeeds_with_valid_addresses() {
        reader();
    }

    #[test]
    fn timeout_and_connection_errors_classify_as_transient() {
        assert!(classify_contract_error("request timed out").is_transient());
        assert!(classify_contract_error("connection reset by peer").is_transient());
        assert!(classify_contract_error("429 Too Many Requests").is_transient());
    }

    #[test]
    fn revert_errors_classify_as_permanent_chain_errors() {
        let err = classify_contract_error("execution reverted: insufficient balance");
        assert!(!err.is_transient());
        assert!(matches!(err, RewardError::Chain(_)));
    }
}
