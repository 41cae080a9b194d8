//! 信贷申请处理服务
//!
//! 装配配置、可观测性、存储、缓存、事件发布与决策引擎，
//! 启动信贷处理器并在收到停止信号后优雅退出。

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};

use credit_shared::{
    cache::{CacheStore, RedisCache},
    config::AppConfig,
    database::Database,
    events::{EventPublisher, InMemoryEventPublisher},
    kafka::KafkaEventPublisher,
    observability::{self, PrometheusSink},
};
use decision_engine::{BankTypeRule, DecisionEngine, PaymentRangeRule, RuleEngine};

use credit_processing::{
    repository::{
        BankRepository, ClientRepository, CreditRepository, InMemoryBankRepository,
        InMemoryClientRepository, InMemoryCreditRepository, MIGRATOR, PgBankRepository,
        PgClientRepository, PgCreditRepository,
    },
    service::{CreditProcessor, CreditProcessorDeps},
};

type Repositories = (
    Arc<dyn ClientRepository>,
    Arc<dyn BankRepository>,
    Arc<dyn CreditRepository>,
);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置，失败时回退到默认值
    let config = AppConfig::load("credit-processing-service").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });

    // 2. 可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting credit-processing-service...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 存储：启用数据库时使用 PostgreSQL，否则使用内存仓储
    let database = if config.database.enabled {
        Some(Database::connect_and_migrate(&config.database, &MIGRATOR).await?)
    } else {
        warn!("Database disabled, using in-memory repositories");
        None
    };

    let (clients, banks, credits) = match &database {
        Some(db) => postgres_repositories(db),
        None => in_memory_repositories(),
    };

    // 4. 缓存（可选）
    let cache: Option<Arc<dyn CacheStore>> = if config.redis.enabled {
        let redis = RedisCache::new(&config.redis).await?;
        redis.health_check().await?;
        Some(Arc::new(redis))
    } else {
        warn!("Redis disabled, credit reads go straight to storage");
        None
    };

    // 5. 事件发布
    let publisher: Arc<dyn EventPublisher> = if config.kafka.enabled {
        Arc::new(KafkaEventPublisher::from_config(&config.kafka)?)
    } else {
        warn!("Kafka disabled, domain events are kept in memory");
        Arc::new(InMemoryEventPublisher::new())
    };

    // 6. 决策引擎，注册顺序即评估顺序
    let engine = Arc::new(RuleEngine::new());
    engine.register_rule(Arc::new(PaymentRangeRule));
    engine.register_rule(Arc::new(BankTypeRule));
    info!(rules = ?engine.rule_names(), "Decision engine initialized");

    // 7. 信贷处理器
    let processor = CreditProcessor::new(
        CreditProcessorDeps {
            clients,
            banks,
            credits,
            engine,
            cache,
            publisher: publisher.clone(),
            metrics: Arc::new(PrometheusSink),
        },
        &config.processor,
    );

    shutdown_signal().await;

    processor.shutdown().await;
    if let Err(e) = publisher.close().await {
        error!(error = %e, "Failed to close event publisher");
    }
    if let Some(db) = database {
        db.close().await;
    }

    info!("Service shutdown complete");
    Ok(())
}

fn postgres_repositories(db: &Database) -> Repositories {
    (
        Arc::new(PgClientRepository::new(db.pool().clone())),
        Arc::new(PgBankRepository::new(db.pool().clone())),
        Arc::new(PgCreditRepository::new(db.pool().clone())),
    )
}

fn in_memory_repositories() -> Repositories {
    (
        Arc::new(InMemoryClientRepository::new()),
        Arc::new(InMemoryBankRepository::new()),
        Arc::new(InMemoryCreditRepository::new()),
    )
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
