//! Position state manager and lifecycle reconciler.
//!
//! [`decide`] is a pure function: given freshly observed chain context for a
//! position, it returns the state and reward-eligibility the position should
//! have. It never sees "missing from chain" — that's the reconciler's
//! concern, tracked per token across passes before any closeout gating.

use crate::contracts::ChainReader;
use crate::storage::PositionStore;
use parking_lot::Mutex;
use reward_types::{PositionState, PositionStateContext, RewardResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Consecutive "missing from chain" reads, spaced at least
/// [`SUSPECT_MISSING_WINDOW`] apart, tolerated before a position is treated
/// as a genuine close-out rather than a transient RPC/indexing gap.
const SUSPECT_MISSING_THRESHOLD: u32 = 3;

/// Minimum spacing enforced between two reads that both count toward
/// [`SUSPECT_MISSING_THRESHOLD`] — guards against one reconciliation pass
/// retried in a tight loop looking like several independent confirmations.
const SUSPECT_MISSING_WINDOW: Duration = Duration::from_secs(60);

/// Owners reconciled concurrently per pass.
const RECONCILE_BATCH_SIZE: usize = 3;

/// Derives the target state for a position from a single, freshly observed
/// context. Rules apply top to bottom; the first match wins.
pub fn decide(ctx: &PositionStateContext) -> (PositionState, bool) {
    if ctx.has_blockchain_liquidity || ctx.current_value_usd >= ctx_significance_threshold(ctx) {
        return (PositionState::Active, true);
    }
    if !ctx.has_blockchain_liquidity && ctx.has_unclaimed_tokens {
        return (PositionState::NeedsCloseout, true);
    }
    (PositionState::Inactive, false)
}

/// The significance threshold travels with the context so `decide` stays a
/// pure function of its single argument; callers populate it from program
/// settings before invoking.
fn ctx_significance_threshold(ctx: &PositionStateContext) -> f64 {
    ctx.significance_threshold_usd
}

struct SuspectEntry {
    count: u32,
    last_seen: Instant,
}

/// Periodic loop that re-derives every enrolled user's positions from a
/// fresh per-owner chain read and commits the owner's transitions as one
/// transaction.
pub struct LifecycleReconciler {
    store: PositionStore,
    chain: Arc<ChainReader>,
    significance_threshold_usd: f64,
    suspect: Arc<Mutex<HashMap<u64, SuspectEntry>>>,
}

impl LifecycleReconciler {
    pub fn new(store: PositionStore, chain: Arc<ChainReader>, significance_threshold_usd: f64) -> Self {
        Self {
            store,
            chain,
            significance_threshold_usd,
            suspect: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, interval: Duration) -> RewardResult<()> {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        tracing::error!(error = %e, "lifecycle reconciliation pass failed");
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

    async fn reconcile_once(&self) -> RewardResult<()> {
        let users = self.store.list_users()?;
        tracing::info!(count = users.len(), "starting lifecycle reconciliation pass");

        let mut remaining = users;
        while !remaining.is_empty() {
            let batch: Vec<_> = remaining.drain(..remaining.len().min(RECONCILE_BATCH_SIZE)).collect();
            let futures = batch.into_iter().map(|user| self.reconcile_owner(user.id, user.address));
            futures::future::join_all(futures).await;
        }
        Ok(())
    }

    async fn reconcile_owner(&self, user_id: uuid::Uuid, owner: reward_types::EthAddress) {
        let enrolled = match self.store.get_positions_by_owner(user_id) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to load enrolled positions for owner");
                return;
            }
        };
        if enrolled.is_empty() {
            return;
        }

        let on_chain = match self.chain.positions_of_owner(&owner).await {
            Ok(positions) => positions,
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, %owner, "transient chain read failure; skipping owner this pass");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, %owner, "permanent chain read failure for owner");
                return;
            }
        };

        let mut transitions = Vec::with_capacity(enrolled.len());
        for position in &enrolled {
            let found = on_chain.iter().find(|p| p.token_id == position.token_id);
            let (state, eligible) = match found {
                Some(p) => {
                    self.suspect.lock().remove(&position.token_id);
                    let ctx = PositionStateContext {
                        token_id: position.token_id,
                        has_blockchain_liquidity: p.liquidity > 0,
                        blockchain_liquidity: p.liquidity,
                        current_value_usd: position.current_value_usd.as_f64(),
                        has_unclaimed_tokens: p.has_unclaimed_tokens,
                        is_on_blockchain: true,
                        significance_threshold_usd: self.significance_threshold_usd,
                    };
                    decide(&ctx)
                }
                None => {
                    let confirmed = self.confirm_missing(position.token_id);
                    if !confirmed {
                        tracing::debug!(token_id = position.token_id, "position missing from owner's on-chain set, awaiting confirmation");
                        continue;
                    }
                    let ctx = PositionStateContext {
                        token_id: position.token_id,
                        has_blockchain_liquidity: false,
                        blockchain_liquidity: 0,
                        current_value_usd: position.current_value_usd.as_f64(),
                        has_unclaimed_tokens: false,
                        is_on_blockchain: false,
                        significance_threshold_usd: self.significance_threshold_usd,
                    };
                    decide(&ctx)
                }
            };
            let is_active = matches!(state, PositionState::Active);
            if is_active != position.is_active || eligible != position.reward_eligible {
                transitions.push((position.token_id, is_active, eligible));
            }
        }

        if let Err(e) = self.store.apply_position_state_transitions(&transitions) {
            tracing::error!(error = %e, %owner, "failed to commit owner's position state transitions");
        }
    }

    /// Records one "missing from this owner's on-chain set" observation for
    /// `token_id`, spaced by [`SUSPECT_MISSING_WINDOW`], and reports whether
    /// enough have now accumulated to treat the position as genuinely gone.
    fn confirm_missing(&self, token_id: u64) -> bool {
        let mut suspects = self.suspect.lock();
        let now = Instant::now();
        let entry = suspects.entry(token_id).or_insert(SuspectEntry { count: 0, last_seen: now - SUSPECT_MISSING_WINDOW });
        if now.duration_since(entry.last_seen) >= SUSPECT_MISSING_WINDOW {
            entry.count += 1;
            entry.last_seen = now;
        }
        entry.count >= SUSPECT_MISSING_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(on_chain: bool, liquidity: u128, value_usd: f64, unclaimed: bool, threshold: f64) -> PositionStateContext {
        PositionStateContext {
            token_id: 1,
            has_blockchain_liquidity: liquidity > 0,
            blockchain_liquidity: liquidity,
            current_value_usd: value_usd,
            has_unclaimed_tokens: unclaimed,
            is_on_blockchain: on_chain,
            significance_threshold_usd: threshold,
        }
    }

    #[test]
    fn blockchain_liquidity_alone_is_active() {
        let (state, eligible) = decide(&ctx(true, 1_000, 0.0, false, 1.0));
        assert_eq!(state, PositionState::Active);
        assert!(eligible);
    }

    #[test]
    fn value_above_threshold_without_liquidity_is_active() {
        let (state, eligible) = decide(&ctx(true, 0, 50.0, false, 1.0));
        assert_eq!(state, PositionState::Active);
        assert!(eligible);
    }

    #[test]
    fn no_liquidity_with_unclaimed_tokens_needs_closeout() {
        let (state, eligible) = decide(&ctx(true, 0, 0.0, true, 1.0));
        assert_eq!(state, PositionState::NeedsCloseout);
        assert!(eligible);
    }

    #[test]
    fn no_liquidity_no_unclaimed_goes_inactive() {
        let (state, eligible) = decide(&ctx(true, 0, 0.0, false, 1.0));
        assert_eq!(state, PositionState::Inactive);
        assert!(!eligible);
    }

    #[test]
    fn below_significance_threshold_without_liquidity_is_inactive() {
        let (state, eligible) = decide(&ctx(true, 0, 0.0001, false, 1.0));
        assert_eq!(state, PositionState::Inactive);
        assert!(!eligible);
    }

    #[test]
    fn suspect_missing_requires_three_spaced_confirmations() {
        let reconciler = LifecycleReconciler::new(
            PositionStore::open_in_memory().unwrap(),
            Arc::new(dummy_chain_reader()),
            1.0,
        );
        assert!(!reconciler.confirm_missing(42));
        {
            let mut suspects = reconciler.suspect.lock();
            let entry = suspects.get_mut(&42).unwrap();
            entry.last_seen -= SUSPECT_MISSING_WINDOW;
        }
        assert!(!reconciler.confirm_missing(42));
        {
            let mut suspects = reconciler.suspect.lock();
            let entry = suspects.get_mut(&42).unwrap();
            entry.last_seen -= SUSPECT_MISSING_WINDOW;
        }
        assert!(reconciler.confirm_missing(42));
    }

    fn dummy_chain_reader() -> ChainReader {
        ChainReader::new(&crate::config::ChainConfig {
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
}
