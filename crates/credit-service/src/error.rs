//! 信贷服务错误类型
//!
//! 调用方可见的错误分类。缓存与事件发布失败只记录日志，不会出现在这里。

use credit_shared::error::SharedError;
use decision_engine::DecisionError;
use thiserror::Error;

/// 信贷服务错误类型
#[derive(Debug, Error)]
pub enum CreditError {
    // === 业务错误 ===
    #[error("参数校验失败: {0}")]
    InvalidInput(String),

    #[error("客户不存在: {0}")]
    ClientNotFound(String),

    #[error("银行不存在: {0}")]
    BankNotFound(String),

    #[error("资格评估失败: {0}")]
    Evaluation(#[from] DecisionError),

    // === 调用方中止 ===
    #[error("请求已取消")]
    Canceled,

    #[error("请求已超时")]
    DeadlineExceeded,

    #[error("信贷处理器已停止")]
    ProcessorStopped,

    // === 系统错误 ===
    #[error("持久化失败: {0}")]
    Persistence(#[from] SharedError),
}

/// 信贷服务 Result 类型别名
pub type Result<T> = std::result::Result<T, CreditError>;

impl From<validator::ValidationErrors> for CreditError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidInput(errors.to_string())
    }
}

impl From<sqlx::Error> for CreditError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(SharedError::Database(err))
    }
}

impl CreditError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence(e) => e.is_retryable(),
            Self::DeadlineExceeded => true,
            _ => false,
        }
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::ClientNotFound(_) | Self::BankNotFound(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            Self::BankNotFound(_) => "BANK_NOT_FOUND",
            Self::Evaluation(_) => "EVALUATION_FAILED",
            Self::Canceled => "CANCELED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::ProcessorStopped => "PROCESSOR_STOPPED",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}
