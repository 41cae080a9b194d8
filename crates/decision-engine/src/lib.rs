//! 信贷资格决策引擎
//!
//! 按注册顺序对规则做瀑布式评估：第一个通过的规则胜出，
//! 全部拒绝时返回最后一个规则的结果，没有规则时返回 `none` 哨兵结果。

pub mod engine;
pub mod error;
pub mod models;
pub mod rules;

pub use engine::{DecisionEngine, Rule, RuleEngine};
pub use error::{DecisionError, Result};
pub use models::{EligibilityInput, EligibilityResult, RuleVerdict};
pub use rules::{BankTypeRule, PaymentRangeRule};
