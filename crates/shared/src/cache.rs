//! 缓存端口与实现
//!
//! `CacheStore` 提供字符串级别的 get/set/incr/expire/delete，
//! `JsonCache` 是可选能力，通过 `CacheStore::as_json()` 发现。
//! 调用方在缓存缺失 JSON 能力或未配置缓存时退化为只读写存储。

use crate::config::RedisConfig;
use crate::error::{Result, SharedError};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==================== 端口定义 ====================

/// 基础缓存操作
///
/// `ttl_seconds` 为 0 表示永不过期。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// 自增 1，返回自增后的值；key 不存在时从 0 开始
    async fn incr(&self, key: &str) -> Result<i64>;

    /// 重设过期时间；`ttl_seconds` 为 0 时移除过期时间
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// JSON 能力发现，默认不支持
    fn as_json(&self) -> Option<&dyn JsonCache> {
        None
    }
}

/// 结构化 JSON 读写能力
#[async_trait]
pub trait JsonCache: Send + Sync {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set_json(&self, key: &str, value: &serde_json::Value, ttl_seconds: u64) -> Result<()>;
}

/// 按类型读取 JSON 缓存
///
/// 缓存中的值无法反序列化为 `T` 时返回 `SharedError::Serialization`，
/// 由调用方决定是否当作未命中处理。
pub async fn get_typed<T: DeserializeOwned>(cache: &dyn JsonCache, key: &str) -> Result<Option<T>> {
    match cache.get_json(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// 按类型写入 JSON 缓存
pub async fn set_typed<T: Serialize + ?Sized>(
    cache: &dyn JsonCache,
    key: &str,
    value: &T,
    ttl_seconds: u64,
) -> Result<()> {
    let value = serde_json::to_value(value)?;
    cache.set_json(key, &value, ttl_seconds).await
}

// ==================== Redis 实现 ====================

/// Redis 缓存客户端
///
/// 启动时建立一条多路复用连接，各操作克隆句柄共享这条连接。
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// 连接 Redis
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis connection established");
        Ok(Self { conn })
    }

    fn get_conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.get_conn();
        if ttl_seconds > 0 {
            let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.get_conn();
        let result: i64 = conn.incr(key, 1).await?;
        Ok(result)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.get_conn();
        if ttl_seconds > 0 {
            let _: bool = conn.expire(key, ttl_seconds as i64).await?;
        } else {
            let _: bool = conn.persist(key).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    fn as_json(&self) -> Option<&dyn JsonCache> {
        Some(self)
    }
}

#[async_trait]
impl JsonCache for RedisCache {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        match CacheStore::get(self, key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json(&self, key: &str, value: &serde_json::Value, ttl_seconds: u64) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        CacheStore::set(self, key, &serialized, ttl_seconds).await
    }
}

// ==================== 内存实现 ====================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// 进程内缓存
///
/// 用于开发模式和测试。支持 TTL、关闭 JSON 能力以及注入失败，
/// 并统计访问次数以便断言“没有访问缓存”。
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
    json_enabled: bool,
    failing: AtomicBool,
    operations: AtomicUsize,
}

impl InMemoryCache {
    /// 创建支持 JSON 能力的内存缓存
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            json_enabled: true,
            failing: AtomicBool::new(false),
            operations: AtomicUsize::new(0),
        }
    }

    /// 创建只支持字符串操作的内存缓存
    pub fn without_json() -> Self {
        Self {
            json_enabled: false,
            ..Self::new()
        }
    }

    /// 之后的所有操作都返回错误
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 已执行的操作次数（包括失败的操作）
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// 当前未过期的 key 是否存在
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// 直接写入原始字符串，绕过计数和失败注入，用于构造损坏数据
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    fn begin(&self, op: &str, key: &str) -> Result<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SharedError::Cache(format!("{op} {key}: cache unavailable")));
        }
        Ok(())
    }

    fn expiry(ttl_seconds: u64) -> Option<Instant> {
        (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds))
    }

    fn read(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            debug!(key, "缓存条目已过期");
            return None;
        }
        Some(entry.value.clone())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.begin("get", key)?;
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.begin("set", key)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Self::expiry(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.begin("incr", key)?;
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.is_expired() {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| SharedError::Cache(format!("incr {key}: value is not an integer")))?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| SharedError::Cache(format!("incr {key}: increment would overflow")))?;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        self.begin("expire", key)?;
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Self::expiry(ttl_seconds);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.begin("delete", key)?;
        self.entries.remove(key);
        Ok(())
    }

    fn as_json(&self) -> Option<&dyn JsonCache> {
        if self.json_enabled { Some(self) } else { None }
    }
}

#[async_trait]
impl JsonCache for InMemoryCache {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.begin("get_json", key)?;
        match self.read(key) {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json(&self, key: &str, value: &serde_json::Value, ttl_seconds: u64) -> Result<()> {
        self.begin("set_json", key)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: serde_json::to_string(value)?,
                expires_at: Self::expiry(ttl_seconds),
            },
        );
        Ok(())
    }
}

// ==================== 缓存键 ====================

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    pub fn credit(credit_id: &str) -> String {
        format!("credit:{}", credit_id)
    }

    pub fn rate_limit(client_id: &str) -> String {
        format!("ratelimit:{}", client_id)
    }
}

// ==================== 限流 ====================

/// 固定窗口限流器
///
/// 窗口内第一次请求设置 key 的过期时间，计数超过上限即拒绝。
/// 缓存不可用时放行，限流不能成为可用性的单点。
/// 上限或窗口不大于 0 时分别取 100 次和 60 秒。
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn CacheStore>,
    max_requests: i64,
    window_seconds: u64,
}

impl RateLimiter {
    pub const DEFAULT_MAX_REQUESTS: i64 = 100;
    pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

    pub fn new(cache: Arc<dyn CacheStore>, max_requests: i64, window_seconds: u64) -> Self {
        Self {
            cache,
            max_requests: if max_requests > 0 {
                max_requests
            } else {
                Self::DEFAULT_MAX_REQUESTS
            },
            window_seconds: if window_seconds > 0 {
                window_seconds
            } else {
                Self::DEFAULT_WINDOW_SECONDS
            },
        }
    }

    pub fn from_config(cache: Arc<dyn CacheStore>, config: &crate::config::RateLimitConfig) -> Self {
        Self::new(cache, config.max_requests, config.window_seconds)
    }

    /// 判断该客户端本次请求是否放行
    #[instrument(skip(self))]
    pub async fn allow(&self, client_id: &str) -> bool {
        let key = CacheKey::rate_limit(client_id);

        let count = match self.cache.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(client_id, error = %e, "限流计数失败，放行请求");
                return true;
            }
        };

        if count == 1
            && let Err(e) = self.cache.expire(&key, self.window_seconds).await
        {
            warn!(client_id, error = %e, "设置限流窗口失败");
        }

        if count > self.max_requests {
            debug!(client_id, count, max = self.max_requests, "请求被限流");
            return false;
        }
        true
    }
}
