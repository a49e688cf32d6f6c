use clap::Parser;
use reward_daemon::accounting::RewardAccountant;
use reward_daemon::claims::{ClaimAuthorizer, LocalSigner, Signer};
use reward_daemon::config::DaemonConfig;
use reward_daemon::contracts::ChainReader;
use reward_daemon::lifecycle::LifecycleReconciler;
use reward_daemon::oracle::PriceOracleClient;
use reward_daemon::storage::{PositionStore, StorageConfig};
use reward_daemon::validator::SyncValidator;
use reward_daemon::{api, RestartPolicy, TaskSupervisor};
use reward_types::{RewardError, RewardResult, Secp256k1PrivateKey};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "reward-daemon", about = "Liquidity-mining reward accounting daemon")]
struct Cli {
    #[arg(long, env = "REWARD_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

fn init_logging(config: &DaemonConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_signer() -> RewardResult<Arc<dyn Signer>> {
    match std::env::var("REWARD_CLAIM_SIGNER_KEY") {
        Ok(hex_key) => {
            let bytes = hex::decode(hex_key.trim_start_matches("0x"))
                .map_err(|e| RewardError::Config(format!("REWARD_CLAIM_SIGNER_KEY: {e}")))?;
            let mut arr = [0u8; 32];
            if bytes.len() != 32 {
                return Err(RewardError::Config("REWARD_CLAIM_SIGNER_KEY must be 32 bytes".into()));
            }
            arr.copy_from_slice(&bytes);
            let key = Secp256k1PrivateKey::from_bytes(arr);
            Ok(Arc::new(LocalSigner::new(key)?))
        }
        Err(_) => {
            tracing::warn!("REWARD_CLAIM_SIGNER_KEY not set, generating an ephemeral signing key for this run");
            let key = reward_crypto::generate_private_key();
            Ok(Arc::new(LocalSigner::new(key)?))
        }
    }
}

#[tokio::main]
async fn main() -> RewardResult<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli.config)?;
    init_logging(&config);
    config.log_security_warnings();

    let store = PositionStore::open(&StorageConfig {
        path: config.data_dir.join("rewards.db"),
        ..StorageConfig::default()
    })?;
    if store.get_treasury_config()?.is_none() {
        store.save_treasury_config(&config.treasury)?;
    }
    if store.get_program_settings()?.is_none() {
        store.save_program_settings(&config.settings)?;
    }

    let chain = Arc::new(ChainReader::new(&config.chain)?);
    let oracle = PriceOracleClient::new(&config.oracle)?;
    let signer = load_signer()?;

    let reward_contract = reward_types::EthAddress::from_hex(&config.chain.treasury_contract_address)?;
    let claims = Arc::new(ClaimAuthorizer::new(
        store.clone(),
        chain.clone(),
        signer,
        reward_contract,
        config.chain.chain_id,
    ));
    let validator = Arc::new(SyncValidator::new(store.clone(), chain.clone()));
    let analytics = Arc::new(reward_daemon::analytics::AnalyticsAggregator::new(
        store.clone(),
        oracle.clone(),
    ));
    let reconciler = Arc::new(LifecycleReconciler::new(
        store.clone(),
        chain.clone(),
        config.settings.significance_threshold_usd,
    ));
    let accountant = Arc::new(RewardAccountant::new(store.clone(), oracle.clone(), chain.clone()));

    let supervisor = Arc::new(TaskSupervisor::new());

    {
        let reconciler = reconciler.clone();
        let interval = Duration::from_secs(config.scheduling.reconciler_interval_secs);
        supervisor.spawn("lifecycle-reconciler", RestartPolicy::ExponentialBackoff, move |shutdown| {
            let reconciler = reconciler.clone();
            async move { reconciler.run(shutdown, interval).await }
        })?;
    }
    {
        let validator = validator.clone();
        let interval = Duration::from_secs(config.scheduling.validator_interval_secs);
        supervisor.spawn("sync-validator", RestartPolicy::ExponentialBackoff, move |shutdown| {
            let validator = validator.clone();
            async move { validator.run(shutdown, interval).await }
        })?;
    }
    {
        let accountant = accountant.clone();
        let epoch = Duration::from_secs(config.scheduling.accountant_epoch_secs);
        let jitter = Duration::from_secs(config.scheduling.accountant_jitter_secs);
        supervisor.spawn("reward-accountant", RestartPolicy::ExponentialBackoff, move |shutdown| {
            let accountant = accountant.clone();
            async move { accountant.run(shutdown, epoch, jitter).await }
        })?;
    }

    let api_state = api::ApiState {
        store,
        chain,
        oracle,
        analytics,
        claims,
        validator,
        supervisor: supervisor.clone(),
        config: Arc::new(config.api.clone()),
    };

    let bind_addr = config.api.bind_addr.clone();
    let server = tokio::spawn(async move { api::serve(api_state, &bind_addr).await });

    let supervision_loop = {
        let supervisor = supervisor.clone();
        let interval = Duration::from_secs(config.scheduling.supervision_check_interval_secs);
        tokio::spawn(async move { supervisor.run_supervision_loop(interval).await })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| RewardError::Internal(e.to_string()))?;
    tracing::info!("shutdown signal received");

    supervisor
        .shutdown(Duration::from_secs(config.scheduling.shutdown_grace_secs))
        .await?;
    supervision_loop.abort();
    server.abort();

    Ok(())
}
