//! Sync validator: an independent loop that cross-checks the position
//! store against fresh chain reads and records any disagreement. It never
//! shares the reconciler's in-flight state, so a bug in one does not mask
//! a bug in the other.

use crate::contracts::ChainReader;
use crate::lifecycle::decide;
use crate::storage::PositionStore;
use chrono::Utc;
use reward_types::{DiscrepancySeverity, PositionState, PositionStateContext, RewardResult, SyncDiscrepancy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidatorHealthReport {
    pub total_discrepancies: u64,
    pub critical_count: u64,
    pub auto_fixed_count: u64,
    pub recent: Vec<SyncDiscrepancy>,
}

pub struct SyncValidator {
    store: PositionStore,
    chain: Arc<ChainReader>,
}

impl SyncValidator {
    pub fn new(store: PositionStore, chain: Arc<ChainReader>) -> Self {
        Self { store, chain }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>, interval: Duration) -> RewardResult<()> {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.validate_once().await {
                        tracing::error!(error = %e, "sync validation pass failed");
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

    async fn validate_once(&self) -> RewardResult<()> {
        let threshold = self
            .store
            .get_program_settings()?
            .map(|s| s.significance_threshold_usd)
            .unwrap_or(0.0);
        let positions = self.store.list_all_positions()?;
        for position in positions {
            let chain_active = match self.chain.position(position.token_id).await {
                Ok(p) => {
                    let ctx = PositionStateContext {
                        token_id: position.token_id,
                        has_blockchain_liquidity: p.liquidity > 0,
                        blockchain_liquidity: p.liquidity,
                        current_value_usd: position.current_value_usd.as_f64(),
                        has_unclaimed_tokens: p.has_unclaimed_tokens,
                        is_on_blockchain: true,
                        significance_threshold_usd: threshold,
                    };
                    matches!(decide(&ctx).0, PositionState::Active)
                }
                Err(e) if e.is_transient() => continue,
                Err(_) => false,
            };

            if chain_active == position.is_active {
                continue;
            }

            // Any `isActive` disagreement between store and chain is critical;
            // none is auto-fixed here — a human confirms before anything
            // destructive happens.
            self.store.record_discrepancy(&SyncDiscrepancy {
                id: Uuid::new_v4(),
                token_id: position.token_id,
                db_active: position.is_active,
                chain_active,
                severity: DiscrepancySeverity::Critical,
                detected_at: Utc::now(),
                auto_fixed: false,
            })?;

            tracing::warn!(
                token_id = position.token_id,
                "critical sync discrepancy recorded, awaiting manual confirmation"
            );
        }
        Ok(())
    }

    pub fn health_report(&self) -> RewardResult<ValidatorHealthReport> {
        let (total, critical, auto_fixed) = self.store.count_discrepancies()?;
        let recent = self.store.recent_discrepancies(10)?;
        Ok(ValidatorHealthReport {
            total_discrepancies: total,
            critical_count: critical,
            auto_fixed_count: auto_fixed,
            recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn is_active_mismatch_is_always_recorded_critical_and_not_auto_fixed() {
        let store = PositionStore::open_in_memory().unwrap();
        let validator = SyncValidator::new(store.clone(), Arc::new(dummy_chain_reader()));

        store
            .record_discrepancy(&SyncDiscrepancy {
                id: Uuid::new_v4(),
                token_id: 1,
                db_active: true,
                chain_active: false,
                severity: DiscrepancySeverity::Critical,
                detected_at: Utc::now(),
                auto_fixed: false,
            })
            .unwrap();

        let report = validator.health_report().unwrap();
        assert_eq!(report.total_discrepancies, 1);
        assert_eq!(report.critical_count, 1);
        assert_eq!(report.auto_fixed_count, 0);
    }

    #[test]
    fn health_report_reflects_multiple_recorded_discrepancies() {
        let store = PositionStore::open_in_memory().unwrap();
        let validator = SyncValidator::new(store.clone(), Arc::new(dummy_chain_reader()));

        for token_id in [1, 2, 3] {
            store
                .record_discrepancy(&SyncDiscrepancy {
                    id: Uuid::new_v4(),
                    token_id,
                    db_active: false,
                    chain_active: true,
                    severity: DiscrepancySeverity::Critical,
                    detected_at: Utc::now(),
                    auto_fixed: false,
                })
                .unwrap();
        }

        let report = validator.health_report().unwrap();
        assert_eq!(report.total_discrepancies, 3);
        assert_eq!(report.critical_count, 3);
        assert_eq!(report.recent.len(), 3);
    }
}
