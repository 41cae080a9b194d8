//! 决策引擎数据模型

use credit_shared::models::{Bank, Client, CreateCreditInput, CreditType};
use serde::{Deserialize, Serialize};

/// 单次评估的输入
///
/// 由客户、银行和申请条款临时拼装，不做持久化。
#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityInput {
    pub client: Option<Client>,
    pub bank: Option<Bank>,
    pub min_payment: f64,
    pub max_payment: f64,
    pub term_months: i32,
    pub credit_type: CreditType,
}

impl EligibilityInput {
    pub fn new(client: Option<Client>, bank: Option<Bank>, request: &CreateCreditInput) -> Self {
        Self {
            client,
            bank,
            min_payment: request.min_payment,
            max_payment: request.max_payment,
            term_months: request.term_months,
            credit_type: request.credit_type,
        }
    }
}

/// 单条规则的判定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleVerdict {
    pub approved: bool,
    pub priority: i32,
    pub score: f64,
}

impl RuleVerdict {
    pub fn approve(priority: i32, score: f64) -> Self {
        Self {
            approved: true,
            priority,
            score,
        }
    }

    pub fn reject(priority: i32) -> Self {
        Self {
            approved: false,
            priority,
            score: 0.0,
        }
    }
}

/// 引擎评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub approved: bool,
    pub priority: i32,
    pub score: f64,
    pub rule_name: String,
}

impl EligibilityResult {
    pub const NO_RULES: &'static str = "none";

    /// 没有注册任何规则时的哨兵结果
    pub fn no_rules() -> Self {
        Self {
            approved: false,
            priority: 0,
            score: 0.0,
            rule_name: Self::NO_RULES.to_string(),
        }
    }

    pub fn from_verdict(verdict: RuleVerdict, rule_name: &str) -> Self {
        Self {
            approved: verdict.approved,
            priority: verdict.priority,
            score: verdict.score,
            rule_name: rule_name.to_string(),
        }
    }
}
