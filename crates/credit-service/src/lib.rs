//! 信贷申请处理服务
//!
//! 接收信贷申请，查询客户与银行，经决策引擎评估后持久化，
//! 写入缓存并发布生命周期事件。
//!
//! ## 模块结构
//!
//! - `context`: 请求上下文（取消信号与截止时间）
//! - `error`: 调用方可见的错误分类
//! - `events`: 信贷生命周期事件构建
//! - `repository`: 客户、银行、信贷申请仓储
//! - `service`: 信贷处理器与维护服务

pub mod context;
pub mod error;
pub mod events;
pub mod repository;
pub mod service;

pub use context::{CancelHandle, RequestContext};
pub use error::{CreditError, Result};
pub use service::{BankService, ClientService, CreditProcessor, CreditProcessorDeps};
