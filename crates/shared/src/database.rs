//! PostgreSQL 连接池
//!
//! 服务启动时建立连接池并执行迁移；`database.enabled = false` 时服务不会调用这里，
//! 改用内存仓储。

use std::time::{Duration, Instant};

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};

/// 连接池句柄，Clone 共享同一个池
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池并立即做一次探活
    #[instrument(skip(config), fields(max = config.max_connections, min = config.min_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        let db = Self { pool };
        let latency = db.health_check().await?;
        info!(latency_ms = latency.as_millis() as u64, "PostgreSQL 连接池已建立");
        Ok(db)
    }

    /// 建立连接池并执行迁移
    ///
    /// `migrate!` 需要在编译期定位迁移目录，所以 `Migrator` 由持有 migrations 的服务 crate 提供。
    pub async fn connect_and_migrate(config: &DatabaseConfig, migrator: &Migrator) -> Result<Self> {
        let db = Self::connect(config).await?;
        db.run_migrations(migrator).await?;
        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行 `SELECT 1`，返回往返耗时
    pub async fn health_check(&self) -> Result<Duration> {
        let started = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(started.elapsed())
    }

    #[instrument(skip(self, migrator), fields(migrations = migrator.iter().count()))]
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| SharedError::Database(e.into()))?;
        info!("数据库迁移已完成");
        Ok(())
    }

    pub async fn close(&self) {
        if self.pool.is_closed() {
            warn!("连接池已关闭");
            return;
        }
        self.pool.close().await;
        info!("PostgreSQL 连接池已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // 需要 PostgreSQL
    async fn test_connect_and_health_check() {
        let db = Database::connect(&crate::test_utils::test_database_config())
            .await
            .unwrap();
        assert!(db.health_check().await.unwrap() < Duration::from_secs(5));
        db.close().await;
        db.close().await;
    }
}
