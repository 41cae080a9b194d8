//! Kafka 基础设施封装
//!
//! `KafkaProducer` 封装 rdkafka 的 `FutureProducer`，
//! `KafkaEventPublisher` 在其之上实现不阻塞调用方的 `EventPublisher`：
//! 事件先进入有界队列，由单个后台任务按顺序投递。

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::{Result, SharedError};
use crate::events::{DomainEvent, EventPublisher};

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

pub mod topics {
    pub const CREDIT_EVENTS: &str = "credit.events";
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// `FutureProducer` 内部是 Arc 包装的，Clone 代价很低。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// `message.timeout.ms` 设为 5 秒，超时的消息由调用方记录后丢弃。
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| SharedError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息
    pub async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(i32, i64)> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| SharedError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }
}

// ---------------------------------------------------------------------------
// KafkaEventPublisher
// ---------------------------------------------------------------------------

/// 基于 Kafka 的事件发布器
///
/// `publish` 只做 `try_send`，队列满或已关闭时立即返回错误。
/// 后台任务串行投递，因此同一进程内事件的投递顺序与发布顺序一致。
pub struct KafkaEventPublisher {
    sender: parking_lot::Mutex<Option<mpsc::Sender<DomainEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl KafkaEventPublisher {
    /// 创建发布器并启动后台投递任务，必须在 tokio 运行时内调用
    pub fn new(producer: KafkaProducer, topic: impl Into<String>, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let worker = tokio::spawn(Self::run(producer, topic.into(), rx));
        Self {
            sender: parking_lot::Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn from_config(config: &KafkaConfig) -> Result<Self> {
        let producer = KafkaProducer::new(config)?;
        Ok(Self::new(
            producer,
            config.events_topic.clone(),
            config.publish_buffer,
        ))
    }

    async fn run(producer: KafkaProducer, topic: String, mut rx: mpsc::Receiver<DomainEvent>) {
        info!(topic = %topic, "事件投递任务已启动");

        while let Some(event) = rx.recv().await {
            let body = match event.to_json_bytes() {
                Ok(body) => body,
                Err(e) => {
                    error!(event_id = %event.id, error = %e, "事件编码失败，丢弃");
                    continue;
                }
            };

            if let Err(e) = producer.send(&topic, &event.aggregate_id, &body).await {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    aggregate_id = %event.aggregate_id,
                    error = %e,
                    "事件投递失败"
                );
            }
        }

        info!(topic = %topic, "事件投递任务已退出");
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(SharedError::Publish("publisher closed".to_string()));
        };

        sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(ev) => {
                SharedError::Publish(format!("发布队列已满, 丢弃事件 {}", ev.id))
            }
            mpsc::error::TrySendError::Closed(_) => {
                SharedError::Publish("publisher closed".to_string())
            }
        })
    }

    async fn close(&self) -> Result<()> {
        // 丢弃发送端后后台任务会在冲刷完队列后退出
        drop(self.sender.lock().take());

        if let Some(worker) = self.worker.lock().await.take() {
            worker
                .await
                .map_err(|e| SharedError::Internal(format!("事件投递任务异常退出: {e}")))?;
        }
        info!("Kafka 事件发布器已关闭");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    #[test]
    fn test_topic_constants() {
        assert_eq!(topics::CREDIT_EVENTS, "credit.events");
    }

    #[tokio::test]
    #[ignore] // 需要 Kafka
    async fn test_publish_and_close() {
        let config = KafkaConfig {
            enabled: true,
            brokers: std::env::var("TEST_KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            ..Default::default()
        };
        let publisher = KafkaEventPublisher::from_config(&config).unwrap();

        let event = DomainEvent::new(
            EventType::CreditCreated,
            "cr-test",
            &serde_json::json!({"credit_id": "cr-test"}),
        )
        .unwrap();
        publisher.publish(event).await.unwrap();
        publisher.close().await.unwrap();

        let event = DomainEvent::new(EventType::CreditCreated, "cr-test", &1).unwrap();
        assert!(publisher.publish(event).await.is_err());
    }
}
