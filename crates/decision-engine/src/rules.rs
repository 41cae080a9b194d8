//! 内置资格规则

use crate::engine::Rule;
use crate::models::{EligibilityInput, RuleVerdict};

/// 还款区间规则
///
/// 最低还款必须为正、最高还款不低于最低还款、期限为正；
/// 通过时得分为 min/max，申请区间越窄得分越高。
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentRangeRule;

impl PaymentRangeRule {
    pub const NAME: &'static str = "PaymentRangeRule";
    pub const PRIORITY: i32 = 10;
}

impl Rule for PaymentRangeRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&self, input: Option<&EligibilityInput>) -> RuleVerdict {
        let Some(input) = input else {
            return RuleVerdict::reject(0);
        };

        // NaN 参与的比较恒为 false，同样落入拒绝分支
        let valid = input.min_payment > 0.0
            && input.max_payment >= input.min_payment
            && input.term_months > 0;
        if !valid {
            return RuleVerdict::reject(Self::PRIORITY);
        }

        let score = if input.max_payment > 0.0 {
            input.min_payment / input.max_payment
        } else {
            1.0
        };
        RuleVerdict::approve(Self::PRIORITY, score)
    }
}

/// 银行类型规则：政府银行优先
#[derive(Debug, Clone, Copy, Default)]
pub struct BankTypeRule;

impl BankTypeRule {
    pub const NAME: &'static str = "BankTypeRule";
}

impl Rule for BankTypeRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&self, input: Option<&EligibilityInput>) -> RuleVerdict {
        match input.and_then(|i| i.bank.as_ref()) {
            None => RuleVerdict::reject(0),
            Some(bank) if bank.is_government() => RuleVerdict::approve(8, 0.8),
            Some(_) => RuleVerdict::approve(5, 0.5),
        }
    }
}
