//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//!
//! 业务组件只依赖 `MetricsSink` trait：生产环境注入 `PrometheusSink`，
//! 测试注入 `InMemoryMetricsSink` 断言计数。

use anyhow::Result;
use axum::{Router, routing::get};
use dashmap::DashMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

// ==================== 指标名称 ====================

pub mod names {
    pub const CREDITS_CREATED: &str = "credits_created_total";
    pub const CREDITS_APPROVED: &str = "credits_approved_total";
    pub const CREDITS_REJECTED: &str = "credits_rejected_total";
    pub const JOBS_ENQUEUED: &str = "credit_jobs_enqueued_total";
    pub const PROCESSING_FAILURES: &str = "credit_processing_failures_total";
    pub const CACHE_HITS: &str = "credit_cache_hits_total";
    pub const CACHE_MISSES: &str = "credit_cache_misses_total";
    pub const CACHE_ERRORS: &str = "credit_cache_errors_total";
    pub const EVENT_PUBLISH_FAILURES: &str = "credit_event_publish_failures_total";
    pub const PROCESSING_DURATION: &str = "credit_processing_duration_seconds";
    pub const QUEUE_WAIT: &str = "credit_queue_wait_seconds";
}

// ==================== MetricsSink ====================

/// 指标出口
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str);

    fn record_duration(&self, name: &'static str, duration: Duration);
}

/// 转发到 metrics facade，最终由 Prometheus recorder 收集
#[derive(Debug, Clone, Default)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn increment(&self, name: &'static str) {
        metrics::counter!(name).increment(1);
    }

    fn record_duration(&self, name: &'static str, duration: Duration) {
        metrics::histogram!(name).record(duration.as_secs_f64());
    }
}

/// 丢弃所有指标
#[derive(Debug, Clone, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _name: &'static str) {}

    fn record_duration(&self, _name: &'static str, _duration: Duration) {}
}

/// 内存计数，供测试断言
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    counters: DashMap<&'static str, u64>,
    durations: DashMap<&'static str, Vec<Duration>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    pub fn duration_count(&self, name: &str) -> usize {
        self.durations.get(name).map(|v| v.len()).unwrap_or(0)
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn increment(&self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
    }

    fn record_duration(&self, name: &'static str, duration: Duration) {
        self.durations.entry(name).or_default().push(duration);
    }
}

// ==================== Prometheus 导出 ====================

/// Metrics 资源守卫，drop 时停止 HTTP 服务
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 和 `/health` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(names::CREDITS_CREATED, "Total number of persisted credits");
    metrics::describe_counter!(names::CREDITS_APPROVED, "Total number of approved credits");
    metrics::describe_counter!(names::CREDITS_REJECTED, "Total number of rejected credits");
    metrics::describe_counter!(names::JOBS_ENQUEUED, "Total number of jobs handed to workers");
    metrics::describe_counter!(
        names::PROCESSING_FAILURES,
        "Total number of credit jobs that ended with an error"
    );
    metrics::describe_counter!(names::CACHE_HITS, "Credit cache hits");
    metrics::describe_counter!(names::CACHE_MISSES, "Credit cache misses");
    metrics::describe_counter!(names::CACHE_ERRORS, "Credit cache operation failures");
    metrics::describe_counter!(
        names::EVENT_PUBLISH_FAILURES,
        "Domain events that could not be handed to the publisher"
    );
    metrics::describe_histogram!(
        names::PROCESSING_DURATION,
        "Credit business routine duration in seconds"
    );
    metrics::describe_histogram!(
        names::QUEUE_WAIT,
        "Time a credit job spent in the queue in seconds"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}
