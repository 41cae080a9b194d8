//! 共享库
//!
//! 包含信贷服务共用的配置、错误处理、领域模型、数据库连接、缓存、事件与 Kafka 等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod kafka;
pub mod models;
pub mod observability;
pub mod test_utils;
