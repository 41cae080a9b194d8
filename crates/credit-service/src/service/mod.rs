//! 服务层
//!
//! 协调仓储、决策引擎、缓存和事件发布。
//!
//! ## 模块结构
//!
//! - `credit_processor`: 信贷申请处理器（任务队列 + worker 池）
//! - `client_service` / `bank_service`: 客户与银行维护

pub mod bank_service;
pub mod client_service;
pub mod credit_processor;

pub use bank_service::BankService;
pub use client_service::ClientService;
pub use credit_processor::{CreditProcessor, CreditProcessorDeps};
