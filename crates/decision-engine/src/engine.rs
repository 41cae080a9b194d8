//! 规则与决策引擎
//!
//! `RuleEngine` 持有按注册顺序排列的规则列表，评估时在读锁下复制快照后释放锁，
//! 规则评估期间不阻塞注册。

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::models::{EligibilityInput, EligibilityResult, RuleVerdict};

/// 资格规则
///
/// 规则必须是纯函数：同样的输入总是得到同样的判定，输入缺失时拒绝而不是 panic。
#[cfg_attr(test, mockall::automock)]
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate<'a>(&self, input: Option<&'a EligibilityInput>) -> RuleVerdict;
}

/// 决策引擎抽象
#[cfg_attr(test, mockall::automock)]
pub trait DecisionEngine: Send + Sync {
    fn register_rule(&self, rule: Arc<dyn Rule>);

    fn evaluate<'a>(&self, input: Option<&'a EligibilityInput>) -> Result<EligibilityResult>;
}

/// 瀑布式规则引擎
#[derive(Default)]
pub struct RuleEngine {
    rules: RwLock<Vec<Arc<dyn Rule>>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定顺序注册一组规则
    pub fn with_rules(rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// 按评估顺序返回规则名称
    pub fn rule_names(&self) -> Vec<String> {
        self.rules
            .read()
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Rule>> {
        self.rules.read().clone()
    }
}

impl DecisionEngine for RuleEngine {
    fn register_rule(&self, rule: Arc<dyn Rule>) {
        debug!(rule = rule.name(), "注册规则");
        self.rules.write().push(rule);
    }

    #[instrument(skip_all)]
    fn evaluate(&self, input: Option<&EligibilityInput>) -> Result<EligibilityResult> {
        let rules = self.snapshot();

        let mut last = EligibilityResult::no_rules();
        for rule in &rules {
            let verdict = rule.evaluate(input);
            last = EligibilityResult::from_verdict(verdict, rule.name());
            if verdict.approved {
                debug!(
                    rule = %last.rule_name,
                    priority = last.priority,
                    score = last.score,
                    "规则通过"
                );
                return Ok(last);
            }
        }

        debug!(rule = %last.rule_name, "无规则通过");
        Ok(last)
    }
}
