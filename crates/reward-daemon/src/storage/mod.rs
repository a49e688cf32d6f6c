//! The position store: the single source of truth for enrollment state,
//! accrual history and claim authorizations, backed by SQLite.
//!
//! All mutation goes through a single [`parking_lot::Mutex`]-guarded
//! connection so that per-token-id writes from the reconciler, the
//! accountant and the claim API serialize naturally without a separate
//! lock table.

pub mod config;
pub mod metrics;

pub use config::StorageConfig;
pub use metrics::{StorageMetrics, StorageMetricsSnapshot};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reward_types::{
    AdminOperation, ClaimAuthorization, DiscrepancySeverity, EnrolledPosition, FormulaInputs,
    ProgramSettings, RewardAccrual, RewardError, RewardResult, SyncDiscrepancy, TokenAmount,
    TreasuryConfig, User,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use uuid::Uuid;

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_info (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    address TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS enrolled_positions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    token_id INTEGER NOT NULL UNIQUE,
    tick_lower INTEGER NOT NULL,
    tick_upper INTEGER NOT NULL,
    fee_tier INTEGER NOT NULL,
    token0 TEXT NOT NULL,
    token1 TEXT NOT NULL,
    liquidity_units TEXT NOT NULL,
    current_value_usd_raw TEXT NOT NULL,
    current_value_usd_decimals INTEGER NOT NULL,
    is_active INTEGER NOT NULL,
    reward_eligible INTEGER NOT NULL,
    created_via_app INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS reward_accruals (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    position_id TEXT NOT NULL,
    epoch_start TEXT NOT NULL,
    epoch_end TEXT NOT NULL,
    reward_units_raw TEXT NOT NULL,
    reward_units_decimals INTEGER NOT NULL,
    accumulated_units_raw TEXT NOT NULL,
    accumulated_units_decimals INTEGER NOT NULL,
    formula_inputs_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accruals_position ON reward_accruals(position_id);
CREATE INDEX IF NOT EXISTS idx_accruals_user ON reward_accruals(user_id);

CREATE TABLE IF NOT EXISTS claim_authorizations (
    id TEXT PRIMARY KEY,
    user_address TEXT NOT NULL,
    nonce INTEGER NOT NULL,
    cumulative_authorized_units_raw TEXT NOT NULL,
    cumulative_authorized_units_decimals INTEGER NOT NULL,
    signed_at TEXT NOT NULL,
    signature_digest TEXT NOT NULL,
    UNIQUE(user_address, nonce)
);

CREATE TABLE IF NOT EXISTS treasury_config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS program_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_discrepancies (
    id TEXT PRIMARY KEY,
    token_id INTEGER NOT NULL,
    db_active INTEGER NOT NULL,
    chain_active INTEGER NOT NULL,
    severity TEXT NOT NULL,
    detected_at TEXT NOT NULL,
    auto_fixed INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS admin_operations (
    id TEXT PRIMARY KEY,
    operation TEXT NOT NULL,
    performed_at TEXT NOT NULL,
    detail TEXT NOT NULL
);
"#;

/// Shared handle to the SQLite-backed position store.
///
/// Cheap to clone; every clone shares the same connection and metrics.
#[derive(Clone)]
pub struct PositionStore {
    conn: Arc<Mutex<Connection>>,
    metrics: Arc<StorageMetrics>,
}

impl PositionStore {
    pub fn open(config: &StorageConfig) -> RewardResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RewardError::Storage(format!("creating data dir: {e}")))?;
            }
        }
        let conn = Connection::open(&config.path)
            .map_err(|e| RewardError::Storage(format!("opening database: {e}")))?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| RewardError::Storage(e.to_string()))?;
        }
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| RewardError::Storage(format!("applying schema: {e}")))?;
        conn.execute(
            "INSERT INTO schema_info (version) SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM schema_info)",
            params![SCHEMA_VERSION],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            metrics: Arc::new(StorageMetrics::new()),
        })
    }

    /// Opens an in-memory store, used by tests and by local tooling.
    pub fn open_in_memory() -> RewardResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            metrics: Arc::new(StorageMetrics::new()),
        })
    }

    pub fn metrics(&self) -> StorageMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn get_or_create_user(&self, address: &reward_types::EthAddress) -> RewardResult<User> {
        let conn = self.conn.lock();
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT id, created_at FROM users WHERE address = ?1",
                params![address.to_hex()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);

        if let Some((id, created_at)) = existing {
            return Ok(User {
                id: Uuid::parse_str(&id).map_err(|e| RewardError::Storage(e.to_string()))?,
                address: *address,
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .map_err(|e| RewardError::Storage(e.to_string()))?,
            });
        }

        let user = User::new(*address);
        conn.execute(
            "INSERT INTO users (id, address, created_at) VALUES (?1, ?2, ?3)",
            params![user.id.to_string(), address.to_hex(), user.created_at.to_rfc3339()],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(user)
    }

    pub fn upsert_position(&self, position: &EnrolledPosition) -> RewardResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO enrolled_positions (
                id, user_id, token_id, tick_lower, tick_upper, fee_tier, token0, token1,
                liquidity_units, current_value_usd_raw, current_value_usd_decimals,
                is_active, reward_eligible, created_via_app, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
            ON CONFLICT(token_id) DO UPDATE SET
                liquidity_units = excluded.liquidity_units,
                current_value_usd_raw = excluded.current_value_usd_raw,
                current_value_usd_decimals = excluded.current_value_usd_decimals,
                is_active = excluded.is_active,
                reward_eligible = excluded.reward_eligible",
            params![
                position.id.to_string(),
                position.user_id.to_string(),
                position.token_id as i64,
                position.tick_lower,
                position.tick_upper,
                position.fee_tier,
                position.token0.to_hex(),
                position.token1.to_hex(),
                position.liquidity_units.to_string(),
                position.current_value_usd.raw.to_string(),
                position.current_value_usd.decimals,
                position.is_active,
                position.reward_eligible,
                position.created_via_app,
                position.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_position_state(
        &self,
        token_id: u64,
        is_active: bool,
        reward_eligible: bool,
    ) -> RewardResult<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE enrolled_positions SET is_active = ?1, reward_eligible = ?2 WHERE token_id = ?3",
                params![is_active, reward_eligible, token_id as i64],
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        if changed == 0 {
            return Err(RewardError::Storage(format!("unknown token_id {token_id}")));
        }
        Ok(())
    }

    pub fn get_position_by_token_id(&self, token_id: u64) -> RewardResult<Option<EnrolledPosition>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        conn.query_row(
            "SELECT id, user_id, token_id, tick_lower, tick_upper, fee_tier, token0, token1,
                    liquidity_units, current_value_usd_raw, current_value_usd_decimals,
                    is_active, reward_eligible, created_via_app, created_at
             FROM enrolled_positions WHERE token_id = ?1",
            params![token_id as i64],
            row_to_position,
        )
        .optional()
        .map_err(|e| RewardError::Storage(e.to_string()))
    }

    pub fn get_user_by_address(&self, address: &reward_types::EthAddress) -> RewardResult<Option<User>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        conn.query_row(
            "SELECT id, created_at FROM users WHERE address = ?1",
            params![address.to_hex()],
            |row| {
                let id: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                Ok((id, created_at))
            },
        )
        .optional()
        .map_err(|e| RewardError::Storage(e.to_string()))?
        .map(|(id, created_at)| {
            Ok(User {
                id: Uuid::parse_str(&id).map_err(|e| RewardError::Storage(e.to_string()))?,
                address: *address,
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .map_err(|e| RewardError::Storage(e.to_string()))?,
            })
        })
        .transpose()
    }

    pub fn get_user_by_id(&self, user_id: Uuid) -> RewardResult<Option<User>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        conn.query_row(
            "SELECT address, created_at FROM users WHERE id = ?1",
            params![user_id.to_string()],
            |row| {
                let address: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                Ok((address, created_at))
            },
        )
        .optional()
        .map_err(|e| RewardError::Storage(e.to_string()))?
        .map(|(address, created_at)| {
            Ok(User {
                id: user_id,
                address: address.parse().map_err(|_| RewardError::Storage("bad address".into()))?,
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .map_err(|e| RewardError::Storage(e.to_string()))?,
            })
        })
        .transpose()
    }

    pub fn list_users(&self) -> RewardResult<Vec<User>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn
            .prepare("SELECT id, address, created_at FROM users")
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let address: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                Ok((id, address, created_at))
            })
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RewardError::Storage(e.to_string()))?
            .into_iter()
            .map(|(id, address, created_at)| {
                Ok(User {
                    id: Uuid::parse_str(&id).map_err(|e| RewardError::Storage(e.to_string()))?,
                    address: address.parse().map_err(|_| RewardError::Storage("bad address".into()))?,
                    created_at: created_at
                        .parse::<DateTime<Utc>>()
                        .map_err(|e| RewardError::Storage(e.to_string()))?,
                })
            })
            .collect()
    }

    pub fn get_positions_by_owner(&self, user_id: Uuid) -> RewardResult<Vec<EnrolledPosition>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, token_id, tick_lower, tick_upper, fee_tier, token0, token1,
                        liquidity_units, current_value_usd_raw, current_value_usd_decimals,
                        is_active, reward_eligible, created_via_app, created_at
                 FROM enrolled_positions WHERE user_id = ?1",
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id.to_string()], row_to_position)
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RewardError::Storage(e.to_string()))
    }

    /// Commits every position-state transition for one owner's positions in
    /// a single transaction, so a reconciliation pass never leaves an
    /// owner's positions half-updated.
    pub fn apply_position_state_transitions(
        &self,
        transitions: &[(u64, bool, bool)],
    ) -> RewardResult<()> {
        if transitions.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        for (token_id, is_active, reward_eligible) in transitions {
            tx.execute(
                "UPDATE enrolled_positions SET is_active = ?1, reward_eligible = ?2 WHERE token_id = ?3",
                params![is_active, reward_eligible, *token_id as i64],
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        }
        tx.commit().map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(transitions.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn count_registered_users(&self) -> RewardResult<u64> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        Ok(count as u64)
    }

    /// Users with at least one currently eligible (`reward_eligible = 1`)
    /// position — the denominator analytics uses for per-participant APR.
    pub fn count_users_with_eligible_position(&self) -> RewardResult<u64> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT user_id) FROM enrolled_positions WHERE reward_eligible = 1",
                [],
                |r| r.get(0),
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        Ok(count as u64)
    }

    pub fn list_active_positions(&self) -> RewardResult<Vec<EnrolledPosition>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, token_id, tick_lower, tick_upper, fee_tier, token0, token1,
                        liquidity_units, current_value_usd_raw, current_value_usd_decimals,
                        is_active, reward_eligible, created_via_app, created_at
                 FROM enrolled_positions WHERE is_active = 1",
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_position)
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RewardError::Storage(e.to_string()))
    }

    /// Positions still accruing (`reward_eligible = 1`), independent of
    /// `is_active` — a `NeedsCloseout` position has gone inactive on-chain
    /// but remains eligible through its final epoch.
    pub fn list_reward_eligible_positions(&self) -> RewardResult<Vec<EnrolledPosition>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, token_id, tick_lower, tick_upper, fee_tier, token0, token1,
                        liquidity_units, current_value_usd_raw, current_value_usd_decimals,
                        is_active, reward_eligible, created_via_app, created_at
                 FROM enrolled_positions WHERE reward_eligible = 1",
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_position)
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RewardError::Storage(e.to_string()))
    }

    pub fn list_all_positions(&self) -> RewardResult<Vec<EnrolledPosition>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, token_id, tick_lower, tick_upper, fee_tier, token0, token1,
                        liquidity_units, current_value_usd_raw, current_value_usd_decimals,
                        is_active, reward_eligible, created_via_app, created_at
                 FROM enrolled_positions",
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_position)
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RewardError::Storage(e.to_string()))
    }

    /// Appends an accrual row. `accrual.accumulated_units` must already be
    /// the running total; the caller (reward accountant) computes it.
    pub fn record_accrual(&self, accrual: &RewardAccrual) -> RewardResult<()> {
        let conn = self.conn.lock();
        let formula_json = serde_json::to_string(&accrual.formula_inputs)
            .map_err(|e| RewardError::Serialization(e.to_string()))?;
        conn.execute(
            "INSERT INTO reward_accruals (
                id, user_id, position_id, epoch_start, epoch_end,
                reward_units_raw, reward_units_decimals,
                accumulated_units_raw, accumulated_units_decimals, formula_inputs_json
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                accrual.id.to_string(),
                accrual.user_id.to_string(),
                accrual.position_id.to_string(),
                accrual.epoch_start.to_rfc3339(),
                accrual.epoch_end.to_rfc3339(),
                accrual.reward_units.raw.to_string(),
                accrual.reward_units.decimals,
                accrual.accumulated_units.raw.to_string(),
                accrual.accumulated_units.decimals,
                formula_json,
            ],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn accruals_for_user(&self, user_id: Uuid) -> RewardResult<Vec<RewardAccrual>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, position_id, epoch_start, epoch_end,
                        reward_units_raw, reward_units_decimals,
                        accumulated_units_raw, accumulated_units_decimals, formula_inputs_json
                 FROM reward_accruals WHERE user_id = ?1 ORDER BY epoch_end ASC",
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id.to_string()], row_to_accrual)
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RewardError::Storage(e.to_string()))
    }

    /// The position's most recent cumulative accrual total, or zero.
    pub fn cumulative_accrued(&self, position_id: Uuid, decimals: u8) -> RewardResult<TokenAmount> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let raw: Option<String> = conn
            .query_row(
                "SELECT accumulated_units_raw FROM reward_accruals
                 WHERE position_id = ?1 ORDER BY epoch_end DESC LIMIT 1",
                params![position_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        match raw {
            Some(raw) => {
                let raw: u128 = raw.parse().map_err(|e: std::num::ParseIntError| {
                    RewardError::Storage(e.to_string())
                })?;
                Ok(TokenAmount::from_raw(raw, decimals))
            }
            None => Ok(TokenAmount::zero(decimals)),
        }
    }

    pub fn sum_cumulative_authorized(&self, user_address: &reward_types::EthAddress) -> RewardResult<u128> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let raw: Option<String> = conn
            .query_row(
                "SELECT cumulative_authorized_units_raw FROM claim_authorizations
                 WHERE user_address = ?1 ORDER BY nonce DESC LIMIT 1",
                params![user_address.to_hex()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        match raw {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| RewardError::Storage(e.to_string())),
            None => Ok(0),
        }
    }

    pub fn next_claim_nonce(&self, user_address: &reward_types::EthAddress) -> RewardResult<u64> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let max_nonce: Option<i64> = conn
            .query_row(
                "SELECT MAX(nonce) FROM claim_authorizations WHERE user_address = ?1",
                params![user_address.to_hex()],
                |row| row.get(0),
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        Ok(max_nonce.map(|n| n as u64 + 1).unwrap_or(0))
    }

    /// Persists a claim authorization. The `(user_address, nonce)` unique
    /// index rejects replays at the storage layer.
    pub fn record_claim_authorization(&self, auth: &ClaimAuthorization) -> RewardResult<()> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO claim_authorizations (
                id, user_address, nonce, cumulative_authorized_units_raw,
                cumulative_authorized_units_decimals, signed_at, signature_digest
            ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                auth.id.to_string(),
                auth.user_address.to_hex(),
                auth.nonce as i64,
                auth.cumulative_authorized_units.raw.to_string(),
                auth.cumulative_authorized_units.decimals,
                auth.signed_at.to_rfc3339(),
                hex::encode(auth.signature_digest),
            ],
        );
        match result {
            Ok(_) => {
                self.metrics.writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(RewardError::NonceReplay)
            }
            Err(e) => Err(RewardError::Storage(e.to_string())),
        }
    }

    pub fn get_treasury_config(&self) -> RewardResult<Option<TreasuryConfig>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let json: Option<String> = conn
            .query_row("SELECT json FROM treasury_config WHERE id = 1", [], |row| row.get(0))
            .optional()
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        json.map(|j| serde_json::from_str(&j).map_err(|e| RewardError::Serialization(e.to_string())))
            .transpose()
    }

    pub fn save_treasury_config(&self, config: &TreasuryConfig) -> RewardResult<()> {
        let conn = self.conn.lock();
        let json = serde_json::to_string(config).map_err(|e| RewardError::Serialization(e.to_string()))?;
        conn.execute(
            "INSERT INTO treasury_config (id, json) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json",
            params![json],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn get_program_settings(&self) -> RewardResult<Option<ProgramSettings>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let json: Option<String> = conn
            .query_row("SELECT json FROM program_settings WHERE id = 1", [], |row| row.get(0))
            .optional()
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        json.map(|j| serde_json::from_str(&j).map_err(|e| RewardError::Serialization(e.to_string())))
            .transpose()
    }

    pub fn save_program_settings(&self, settings: &ProgramSettings) -> RewardResult<()> {
        let conn = self.conn.lock();
        let json = serde_json::to_string(settings).map_err(|e| RewardError::Serialization(e.to_string()))?;
        conn.execute(
            "INSERT INTO program_settings (id, json) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET json = excluded.json",
            params![json],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_discrepancy(&self, discrepancy: &SyncDiscrepancy) -> RewardResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sync_discrepancies (id, token_id, db_active, chain_active, severity, detected_at, auto_fixed)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                discrepancy.id.to_string(),
                discrepancy.token_id as i64,
                discrepancy.db_active,
                discrepancy.chain_active,
                match discrepancy.severity {
                    DiscrepancySeverity::Critical => "critical",
                    DiscrepancySeverity::Minor => "minor",
                },
                discrepancy.detected_at.to_rfc3339(),
                discrepancy.auto_fixed,
            ],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn recent_discrepancies(&self, limit: u32) -> RewardResult<Vec<SyncDiscrepancy>> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn
            .prepare(
                "SELECT id, token_id, db_active, chain_active, severity, detected_at, auto_fixed
                 FROM sync_discrepancies ORDER BY detected_at DESC LIMIT ?1",
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let severity: String = row.get(4)?;
                Ok(SyncDiscrepancy {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_else(|_| Uuid::nil()),
                    token_id: row.get::<_, i64>(1)? as u64,
                    db_active: row.get(2)?,
                    chain_active: row.get(3)?,
                    severity: if severity == "critical" {
                        DiscrepancySeverity::Critical
                    } else {
                        DiscrepancySeverity::Minor
                    },
                    detected_at: row
                        .get::<_, String>(5)?
                        .parse()
                        .unwrap_or_else(|_| Utc::now()),
                    auto_fixed: row.get(6)?,
                })
            })
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| RewardError::Storage(e.to_string()))
    }

    pub fn count_discrepancies(&self) -> RewardResult<(u64, u64, u64)> {
        let conn = self.conn.lock();
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_discrepancies", [], |r| r.get(0))
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let critical: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sync_discrepancies WHERE severity = 'critical'",
                [],
                |r| r.get(0),
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        let auto_fixed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sync_discrepancies WHERE auto_fixed = 1",
                [],
                |r| r.get(0),
            )
            .map_err(|e| RewardError::Storage(e.to_string()))?;
        Ok((total as u64, critical as u64, auto_fixed as u64))
    }

    pub fn record_admin_operation(&self, op: &AdminOperation) -> RewardResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO admin_operations (id, operation, performed_at, detail) VALUES (?1,?2,?3,?4)",
            params![
                op.id.to_string(),
                op.operation,
                op.performed_at.to_rfc3339(),
                op.detail,
            ],
        )
        .map_err(|e| RewardError::Storage(e.to_string()))?;
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn row_to_accrual(row: &rusqlite::Row<'_>) -> rusqlite::Result<RewardAccrual> {
    let reward_raw: String = row.get(5)?;
    let accumulated_raw: String = row.get(7)?;
    let formula_json: String = row.get(9)?;
    Ok(RewardAccrual {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_else(|_| Uuid::nil()),
        user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap_or_else(|_| Uuid::nil()),
        position_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap_or_else(|_| Uuid::nil()),
        epoch_start: row.get::<_, String>(3)?.parse().unwrap_or_else(|_| Utc::now()),
        epoch_end: row.get::<_, String>(4)?.parse().unwrap_or_else(|_| Utc::now()),
        reward_units: TokenAmount::from_raw(reward_raw.parse().unwrap_or(0), row.get(6)?),
        accumulated_units: TokenAmount::from_raw(accumulated_raw.parse().unwrap_or(0), row.get(8)?),
        formula_inputs: serde_json::from_str(&formula_json).unwrap_or(FormulaInputs {
            share: 0.0,
            time_boost: 0.0,
            in_range_fraction: 0.0,
            full_range_bonus: 0.0,
            normalization_z: 0.0,
            daily_budget: TokenAmount::zero(18),
        }),
    })
}

fn row_to_position(row: &rusqlite::Row<'_>) -> rusqlite::Result<EnrolledPosition> {
    let usd_raw: String = row.get(9)?;
    let liquidity: String = row.get(8)?;
    Ok(EnrolledPosition {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_else(|_| Uuid::nil()),
        user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap_or_else(|_| Uuid::nil()),
        token_id: row.get::<_, i64>(2)? as u64,
        tick_lower: row.get(3)?,
        tick_upper: row.get(4)?,
        fee_tier: row.get(5)?,
        token0: row
            .get::<_, String>(6)?
            .parse()
            .unwrap_or_else(|_| reward_types::EthAddress::zero()),
        token1: row
            .get::<_, String>(7)?
            .parse()
            .unwrap_or_else(|_| reward_types::EthAddress::zero()),
        liquidity_units: liquidity.parse().unwrap_or(0),
        current_value_usd: TokenAmount::from_raw(usd_raw.parse().unwrap_or(0), row.get(10)?),
        is_active: row.get(11)?,
        reward_eligible: row.get(12)?,
        created_via_app: row.get(13)?,
        created_at: row
            .get::<_, String>(14)?
            .parse()
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reward_types::EthAddress;

    fn store() -> PositionStore {
        PositionStore::open_in_memory().unwrap()
    }

    #[test]
    fn user_is_created_once_and_reused() {
        let store = store();
        let addr: EthAddress = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let a = store.get_or_create_user(&addr).unwrap();
        let b = store.get_or_create_user(&addr).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn claim_authorization_rejects_nonce_replay() {
        let store = store();
        let addr: EthAddress = "0x2222222222222222222222222222222222222222".parse().unwrap();
        let auth = ClaimAuthorization {
            id: Uuid::new_v4(),
            user_address: addr,
            nonce: 0,
            cumulative_authorized_units: TokenAmount::from_raw(100, 18),
            signed_at: Utc::now(),
            signature_digest: [7u8; 32],
        };
        store.record_claim_authorization(&auth).unwrap();
        let duplicate = ClaimAuthorization { id: Uuid::new_v4(), ..auth };
        let err = store.record_claim_authorization(&duplicate).unwrap_err();
        assert!(matches!(err, RewardError::NonceReplay));
    }

    #[test]
    fn next_claim_nonce_increments() {
        let store = store();
        let addr: EthAddress = "0x3333333333333333333333333333333333333333".parse().unwrap();
        assert_eq!(store.next_claim_nonce(&addr).unwrap(), 0);
        store
            .record_claim_authorization(&ClaimAuthorization {
                id: Uuid::new_v4(),
                user_address: addr,
                nonce: 0,
                cumulative_authorized_units: TokenAmount::from_raw(1, 18),
                signed_at: Utc::now(),
                signature_digest: [0u8; 32],
            })
            .unwrap();
        assert_eq!(store.next_claim_nonce(&addr).unwrap(), 1);
    }
}
