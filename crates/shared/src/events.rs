//! 领域事件模型与发布端口
//!
//! 信贷申请生命周期事件统一包装在 `DomainEvent` 信封中，
//! 业务数据以 JSON 字节承载。`EventPublisher` 是事件出口的抽象，
//! 实现方不得阻塞调用方（Kafka 实现见 `crate::kafka::KafkaEventPublisher`）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::error::{Result, SharedError};

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    CreditCreated,
    CreditApproved,
    CreditRejected,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CreditCreated => "CreditCreated",
            Self::CreditApproved => "CreditApproved",
            Self::CreditRejected => "CreditRejected",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// 事件信封
///
/// `aggregate_id` 是事件所属实体（信贷申请）的 ID，用作 Kafka 消息 key，
/// 使同一申请的事件落在同一分区内保持顺序。
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub aggregate_id: String,
    pub payload: Vec<u8>,
    pub occurred_at: DateTime<Utc>,
}

/// 线上传输格式，payload 以内嵌 JSON 对象而非字节数组出现
#[derive(Serialize, Deserialize)]
struct WireEvent {
    id: Uuid,
    #[serde(rename = "type")]
    event_type: EventType,
    aggregate_id: String,
    payload: serde_json::Value,
    occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// 序列化业务数据并构建事件，ID 使用时间有序的 UUID v7
    pub fn new<T: Serialize>(
        event_type: EventType,
        aggregate_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::now_v7(),
            event_type,
            aggregate_id: aggregate_id.into(),
            payload: serde_json::to_vec(payload)?,
            occurred_at: Utc::now(),
        })
    }

    /// 反序列化业务数据
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(SharedError::from)
    }

    /// 编码为 JSON 消息体
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let wire = WireEvent {
            id: self.id,
            event_type: self.event_type,
            aggregate_id: self.aggregate_id.clone(),
            payload: serde_json::from_slice(&self.payload)?,
            occurred_at: self.occurred_at,
        };
        serde_json::to_vec(&wire).map_err(SharedError::from)
    }

    /// 从 JSON 消息体解码
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let wire: WireEvent = serde_json::from_slice(bytes)?;
        Ok(Self {
            id: wire.id,
            event_type: wire.event_type,
            aggregate_id: wire.aggregate_id,
            payload: serde_json::to_vec(&wire.payload)?,
            occurred_at: wire.occurred_at,
        })
    }
}

// ---------------------------------------------------------------------------
// EventPublisher
// ---------------------------------------------------------------------------

/// 事件发布端口
///
/// `publish` 只负责把事件交出去，不等待下游确认；
/// 失败由调用方记录日志，不做重试。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// 停止接收新事件并冲刷已缓冲的事件
    async fn close(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// InMemoryEventPublisher
// ---------------------------------------------------------------------------

/// 记录所有已发布事件的内存发布器
///
/// 开发模式下作为默认出口，测试中用于断言事件顺序，并支持注入发布失败。
#[derive(Default)]
pub struct InMemoryEventPublisher {
    events: Mutex<Vec<DomainEvent>>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的 publish 调用全部失败
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 已发布事件快照（按发布顺序）
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    /// 某个实体的事件类型序列
    pub fn event_types_for(&self, aggregate_id: &str) -> Vec<EventType> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.event_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SharedError::Publish("publisher closed".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SharedError::Publish(format!(
                "injected failure for {} {}",
                event.event_type, event.aggregate_id
            )));
        }
        self.events.lock().push(event);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
