//! 统一可观测性模块
//!
//! 提供 tracing（日志）与 metrics（Prometheus 指标）的统一初始化。
//! 业务代码通过注入的 `MetricsSink` 记录指标，不直接依赖全局 recorder。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

pub use crate::config::ObservabilityConfig;
pub use self::metrics::{InMemoryMetricsSink, MetricsSink, NoopMetricsSink, PrometheusSink};

/// 可观测性资源守卫
///
/// 持有指标 HTTP 服务的生命周期，drop 时停止该服务。
pub struct ObservabilityGuard {
    metrics_handle: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 创建一个空的 Guard（用于测试或禁用可观测性时）
    pub fn empty() -> Self {
        Self {
            metrics_handle: None,
        }
    }

    /// 是否启用了 Prometheus 导出
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_handle.is_some()
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self.metrics_handle.take().is_some() {
            info!("Shutting down observability...");
        }
    }
}

/// 统一初始化可观测性
///
/// 先初始化 tracing，保证 metrics 初始化过程中的日志能够输出。
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        "Observability initialized"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    Ok(ObservabilityGuard { metrics_handle })
}
