//! 数据访问层
//!
//! - `traits`: 仓储接口
//! - `client_repo` / `bank_repo` / `credit_repo`: 基于 SQLx 的 PostgreSQL 实现
//! - `memory`: 基于 DashMap 的内存实现（开发模式与测试）

mod bank_repo;
mod client_repo;
mod credit_repo;
pub mod memory;
mod traits;

pub use bank_repo::PgBankRepository;
pub use client_repo::PgClientRepository;
pub use credit_repo::PgCreditRepository;
pub use memory::{InMemoryBankRepository, InMemoryClientRepository, InMemoryCreditRepository};
pub use traits::*;

/// 编译期嵌入的迁移脚本
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
