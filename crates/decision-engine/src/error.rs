//! 决策引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("规则 {rule} 评估失败: {reason}")]
    RuleFailed { rule: String, reason: String },

    #[error("决策引擎内部错误: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DecisionError>;

impl DecisionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RuleFailed { .. } => "RULE_FAILED",
            Self::Internal(_) => "DECISION_INTERNAL_ERROR",
        }
    }

    /// 规则是纯函数，重试不会得到不同结果
    pub fn is_retryable(&self) -> bool {
        false
    }
}
