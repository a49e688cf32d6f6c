//! Daemon configuration: loaded from TOML, overridable via environment
//! variables, validated before the supervised tasks start.

use reward_types::{EthAddress, ProgramSettings, RewardError, RewardResult, TreasuryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub position_nft_address: String,
    pub pool_address: String,
    pub reward_token_address: String,
    pub treasury_contract_address: String,
    /// Maximum retries within the chain reader's backoff budget.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".into(),
            chain_id: 1,
            position_nft_address: "0x0000000000000000000000000000000000000000".into(),
            pool_address: "0x0000000000000000000000000000000000000000".into(),
            reward_token_address: "0x0000000000000000000000000000000000000000".into(),
            treasury_contract_address: "0x0000000000000000000000000000000000000000".into(),
            max_retries: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub endpoint: String,
    pub cache_ttl_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://price.example.invalid/v1/quote".into(),
            cache_ttl_secs: 60,
            stale_after_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub bearer_token: Option<String>,
    pub requests_per_minute: u32,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            bearer_token: None,
            requests_per_minute: 600,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub reconciler_interval_secs: u64,
    pub validator_interval_secs: u64,
    pub accountant_epoch_secs: u64,
    pub accountant_jitter_secs: u64,
    pub shutdown_grace_secs: u64,
    /// How often the supervisor polls its tasks for liveness and restarts
    /// any that have finished.
    pub supervision_check_interval_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            reconciler_interval_secs: 120,
            validator_interval_secs: 300,
            accountant_epoch_secs: reward_types::EPOCH_DURATION_SECS,
            accountant_jitter_secs: 60,
            shutdown_grace_secs: 15,
            supervision_check_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub chain: ChainConfig,
    pub oracle: OracleConfig,
    pub api: ApiConfig,
    pub scheduling: SchedulingConfig,
    pub logging: LoggingConfig,
    pub treasury: TreasuryConfig,
    pub settings: ProgramSettings,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            chain: ChainConfig::default(),
            oracle: OracleConfig::default(),
            api: ApiConfig::default(),
            scheduling: SchedulingConfig::default(),
            logging: LoggingConfig::default(),
            treasury: TreasuryConfig {
                version: 1,
                total_allocation: reward_types::TokenAmount::native("1000000").unwrap(),
                program_start_time: chrono::Utc::now(),
                program_duration_days: 365,
                daily_budget: reward_types::TokenAmount::native("2739.72").unwrap(),
                reward_contract_address: EthAddress::zero(),
                token_address: EthAddress::zero(),
                rollover_bucket: reward_types::TokenAmount::zero(reward_types::REWARD_TOKEN_DECIMALS),
            },
            settings: ProgramSettings {
                time_boost_coefficient: 0.1,
                full_range_bonus: 1.2,
                in_range_multiplier: 1.0,
                significance_threshold_usd: 1.0,
                absolute_max_claim_units: reward_types::TokenAmount::native("1000000").unwrap(),
            },
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> RewardResult<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| RewardError::Config(format!("reading {}: {e}", path.display())))?;
            toml::from_str(&raw).map_err(|e| RewardError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RewardResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RewardError::Config(e.to_string()))?;
            }
        }
        let raw = toml::to_string_pretty(self).map_err(|e| RewardError::Config(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| RewardError::Config(e.to_string()))
    }

    /// `REWARD_` prefixed environment variables override the TOML file, the
    /// same precedence the daemon's config documentation promises operators.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REWARD_CHAIN_RPC_URL") {
            self.chain.rpc_url = v;
        }
        if let Ok(v) = std::env::var("REWARD_API_BIND_ADDR") {
            self.api.bind_addr = v;
        }
        if let Ok(v) = std::env::var("REWARD_API_BEARER_TOKEN") {
            self.api.bearer_token = Some(v);
        }
        if let Ok(v) = std::env::var("REWARD_ORACLE_ENDPOINT") {
            self.oracle.endpoint = v;
        }
        if let Ok(v) = std::env::var("REWARD_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REWARD_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    pub fn validate(&self) -> RewardResult<()> {
        if self.chain.rpc_url.is_empty() {
            return Err(RewardError::Config("chain.rpc_url must not be empty".into()));
        }
        if self.chain.max_retries == 0 {
            return Err(RewardError::Config("chain.max_retries must be >= 1".into()));
        }
        if self.scheduling.reconciler_interval_secs == 0
            || self.scheduling.validator_interval_secs == 0
        {
            return Err(RewardError::Config("scheduling intervals must be > 0".into()));
        }
        if self.settings.full_range_bonus <= 1.0 {
            return Err(RewardError::Config("settings.full_range_bonus must be > 1.0".into()));
        }
        self.check_security_warnings();
        Ok(())
    }

    /// Non-fatal warnings surfaced but not rejected, logged at startup.
    fn check_security_warnings(&self) {
        if self.api.bearer_token.is_none() {
            tracing::warn!("no API bearer token configured; claim/position endpoints are unauthenticated");
        }
        if self.chain.rpc_url.starts_with("http://") {
            tracing::warn!("chain RPC endpoint is not using TLS");
        }
    }

    pub fn log_security_warnings(&self) {
        self.check_security_warnings();
    }

    /// A copy with secrets masked, safe to log or return from a diagnostics endpoint.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api.bearer_token = copy.api.bearer_token.map(|_| "***".to_string());
        copy
    }
}
