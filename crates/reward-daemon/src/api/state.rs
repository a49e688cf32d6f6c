use crate::analytics::AnalyticsAggregator;
use crate::claims::ClaimAuthorizer;
use crate::config::ApiConfig;
use crate::contracts::ChainReader;
use crate::oracle::PriceOracleClient;
use crate::storage::PositionStore;
use crate::supervisor::TaskSupervisor;
use crate::validator::SyncValidator;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub store: PositionStore,
    pub chain: Arc<ChainReader>,
    pub oracle: PriceOracleClient,
    pub analytics: Arc<AnalyticsAggregator>,
    pub claims: Arc<ClaimAuthorizer>,
    pub validator: Arc<SyncValidator>,
    pub supervisor: Arc<TaskSupervisor>,
    pub config: Arc<ApiConfig>,
}
