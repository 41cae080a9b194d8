//! 决策引擎性能基准测试
//!
//! 测试覆盖：
//! - 单条规则评估
//! - 默认规则链（首条命中 / 回落到末条）
//! - 规则数量对瀑布评估的影响

use credit_shared::models::{Bank, BankType, CreditType};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use decision_engine::{
    BankTypeRule, DecisionEngine, EligibilityInput, PaymentRangeRule, Rule, RuleEngine,
};
use std::hint::black_box;
use std::sync::Arc;

fn create_input(min_payment: f64) -> EligibilityInput {
    EligibilityInput {
        client: None,
        bank: Some(Bank {
            id: "bench-bank".to_string(),
            name: "Bench Bank".to_string(),
            bank_type: BankType::Government,
            is_active: true,
        }),
        min_payment,
        max_payment: 500.0,
        term_months: 12,
        credit_type: CreditType::Auto,
    }
}

fn default_engine() -> RuleEngine {
    RuleEngine::with_rules(vec![
        Arc::new(PaymentRangeRule) as Arc<dyn Rule>,
        Arc::new(BankTypeRule),
    ])
}

/// 单条规则评估基准
fn bench_single_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_rule");
    let input = create_input(100.0);

    group.bench_function("payment_range", |b| {
        b.iter(|| PaymentRangeRule.evaluate(black_box(Some(&input))))
    });

    group.bench_function("bank_type", |b| {
        b.iter(|| BankTypeRule.evaluate(black_box(Some(&input))))
    });

    group.finish();
}

/// 默认规则链基准
fn bench_default_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("default_chain");
    let engine = default_engine();

    let first_hit = create_input(100.0);
    group.bench_function("first_rule_approves", |b| {
        b.iter(|| engine.evaluate(black_box(Some(&first_hit))))
    });

    // 最低还款为 0 时第一条规则拒绝，回落到银行类型规则
    let fallthrough = create_input(0.0);
    group.bench_function("fallthrough_to_last", |b| {
        b.iter(|| engine.evaluate(black_box(Some(&fallthrough))))
    });

    group.finish();
}

/// 规则数量对瀑布评估的影响（全部拒绝时遍历整条链）
fn bench_chain_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_length");
    let input = create_input(0.0);

    for count in [1usize, 5, 10, 50] {
        let engine = RuleEngine::new();
        for _ in 0..count {
            engine.register_rule(Arc::new(PaymentRangeRule));
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), &engine, |b, engine| {
            b.iter(|| engine.evaluate(black_box(Some(&input))))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_rules,
    bench_default_chain,
    bench_chain_length
);
criterion_main!(benches);
