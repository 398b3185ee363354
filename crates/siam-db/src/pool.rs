//! # Database Pool
//!
//! [`DbConfig`] describes where the store lives and how hard writers wait on
//! SQLite's lock; [`Database`] owns the pool and hands out the coordinators.
//!
//! Every connection runs in WAL mode with foreign keys on, so reports can
//! read while a sale or payment commits. Writers queue on the database lock
//! for `busy_timeout`; past that the coordinators see `DbError::Busy` and
//! retry the whole commit (see [`EngineConfig::max_commit_attempts`]).

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::contract::ContractManager;
use crate::repository::customer::CustomerRepository;
use crate::repository::inventory::InventoryLedger;
use crate::repository::ledger::LedgerAggregator;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleCoordinator;

const IN_MEMORY_PATH: &str = ":memory:";

/// Where the store lives and how the pool behaves.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Pool size. An in-memory store must stay at one, since every
    /// connection would otherwise open its own empty database.
    pub max_connections: u32,
    /// How long a writer waits on the database lock before SQLITE_BUSY.
    pub busy_timeout: Duration,
    /// How long a caller waits for a free pooled connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Apply embedded migrations when the pool opens.
    pub run_migrations: bool,
    pub engine: EngineConfig,
}

impl DbConfig {
    /// A file-backed store; the file is created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
            engine: EngineConfig::default(),
        }
    }

    /// A throwaway single-connection store, used by the test suites.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            busy_timeout: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(5),
            ..DbConfig::new(IN_MEMORY_PATH)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let url = format!("sqlite://{}?mode=rwc", self.database_path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
            .create_if_missing(true);
        Ok(options)
    }
}

/// Handle to the store. Clones share the pool and the engine settings.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    engine: Arc<EngineConfig>,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening store");

        let options = config.connect_options()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            grace_days = config.engine.grace_days,
            max_commit_attempts = config.engine.max_commit_attempts,
            "Pool ready"
        );

        if config.run_migrations {
            migrations::run_migrations(&pool).await?;
        }

        Ok(Database {
            pool,
            engine: Arc::new(config.engine),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone(), self.engine.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.pool.clone(), self.engine.clone())
    }

    pub fn sales(&self) -> SaleCoordinator {
        SaleCoordinator::new(self.pool.clone(), self.engine.clone())
    }

    pub fn contracts(&self) -> ContractManager {
        ContractManager::new(self.pool.clone(), self.engine.clone())
    }

    pub fn ledger(&self) -> LedgerAggregator {
        LedgerAggregator::new(self.pool.clone())
    }

    /// Waits for checked-out connections to return, then closes the pool.
    pub async fn close(&self) {
        info!("Closing store");
        self.pool.close().await;
    }

    /// True if a trivial query goes through.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
