pub mod migrations;
pub mod sqlite;

pub use migrations::run_migrations;
pub use sqlite::{
    SqliteJobRepository, SqliteReportDataSource, SqliteReportRepository, SqliteScheduleRepository,
};

use std::str::FromStr;
use std::time::Duration;

use regreport_config::DatabaseConfig;
use regreport_core::ReportingResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::{debug, info};

pub type DbPool = Pool<Sqlite>;

/// SQLite连接池管理
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> ReportingResult<Self> {
        let in_memory = config.url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存数据库每个连接各自独立，只能使用单连接
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (config.max_connections, config.min_connections)
        };

        debug!("连接数据库: {}", config.url);
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        info!("数据库连接池已创建，最大连接数 {}", max_connections);
        Ok(Self { pool })
    }

    /// 连接并执行迁移
    pub async fn connect_and_migrate(config: &DatabaseConfig) -> ReportingResult<Self> {
        let manager = Self::new(config).await?;
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> ReportingResult<()> {
        run_migrations(&self.pool).await
    }

    pub async fn health_check(&self) -> ReportingResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
