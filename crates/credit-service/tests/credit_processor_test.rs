//! 信贷处理器集成测试
//!
//! 使用内存仓储、内存缓存、内存事件发布器与内存指标，覆盖完整处理流程。

use std::sync::Arc;
use std::time::Duration;

use credit_processing::events::CreditCreatedPayload;
use credit_processing::repository::{
    InMemoryBankRepository, InMemoryClientRepository, InMemoryCreditRepository,
};
use credit_processing::{CreditError, CreditProcessor, CreditProcessorDeps, RequestContext};
use credit_shared::cache::{CacheKey, CacheStore, InMemoryCache};
use credit_shared::config::ProcessorConfig;
use credit_shared::events::{EventType, InMemoryEventPublisher};
use credit_shared::models::{BankType, Credit, CreditStatus, CreditType, UpdateCreditInput};
use credit_shared::observability::metrics::{InMemoryMetricsSink, names};
use credit_shared::test_utils::TestDataGenerator;
use decision_engine::{BankTypeRule, PaymentRangeRule, Rule};

struct Harness {
    clients: Arc<InMemoryClientRepository>,
    banks: Arc<InMemoryBankRepository>,
    credits: Arc<InMemoryCreditRepository>,
    cache: Arc<InMemoryCache>,
    publisher: Arc<InMemoryEventPublisher>,
    metrics: Arc<InMemoryMetricsSink>,
    processor: Arc<CreditProcessor>,
}

impl Harness {
    fn new() -> Self {
        Self::build(
            vec![
                Arc::new(PaymentRangeRule) as Arc<dyn Rule>,
                Arc::new(BankTypeRule),
            ],
            InMemoryCache::new(),
            ProcessorConfig {
                workers: 4,
                queue_capacity: 16,
                ..Default::default()
            },
        )
    }

    fn build(rules: Vec<Arc<dyn Rule>>, cache: InMemoryCache, config: ProcessorConfig) -> Self {
        let clients = Arc::new(InMemoryClientRepository::new());
        let banks = Arc::new(InMemoryBankRepository::new());
        let credits = Arc::new(InMemoryCreditRepository::new());
        let cache = Arc::new(cache);
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let metrics = Arc::new(InMemoryMetricsSink::new());

        clients.insert(TestDataGenerator::client("c1"));
        banks.insert(TestDataGenerator::bank("b1", BankType::Government));

        let processor = CreditProcessor::new(
            CreditProcessorDeps {
                clients: clients.clone(),
                banks: banks.clone(),
                credits: credits.clone(),
                engine: Arc::new(decision_engine::RuleEngine::with_rules(rules)),
                cache: Some(cache.clone() as Arc<dyn CacheStore>),
                publisher: publisher.clone(),
                metrics: metrics.clone(),
            },
            &config,
        );

        Self {
            clients,
            banks,
            credits,
            cache,
            publisher,
            metrics,
            processor: Arc::new(processor),
        }
    }

    fn storage_calls(&self) -> usize {
        self.clients.call_count() + self.banks.call_count() + self.credits.call_count()
    }
}

fn ctx() -> RequestContext {
    RequestContext::background()
}

fn stored_credit(id: &str, client_id: &str, seconds_ago: i64) -> Credit {
    Credit {
        id: id.to_string(),
        client_id: client_id.to_string(),
        bank_id: "b1".to_string(),
        min_payment: 100.0,
        max_payment: 400.0,
        term_months: 24,
        credit_type: CreditType::Commercial,
        status: CreditStatus::Pending,
        created_at: chrono::Utc::now() - chrono::Duration::seconds(seconds_ago),
        is_active: true,
    }
}

// ==================== 提交流程 ====================

#[tokio::test]
async fn test_submit_approves_and_emits_created_then_approved() {
    let h = Harness::new();

    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();

    assert_eq!(credit.status, CreditStatus::Approved);
    assert_eq!(credit.client_id, "c1");
    assert_eq!(
        h.credits.snapshot(&credit.id).map(|c| c.status),
        Some(CreditStatus::Approved)
    );
    assert_eq!(
        h.publisher.event_types_for(&credit.id),
        vec![EventType::CreditCreated, EventType::CreditApproved]
    );

    let created: CreditCreatedPayload = h.publisher.events()[0].payload_as().unwrap();
    assert_eq!(created.credit_id, credit.id);
    assert_eq!(created.status, CreditStatus::Approved);

    assert!(h.cache.contains_key(&CacheKey::credit(&credit.id)));
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 1);
    assert_eq!(h.metrics.counter(names::CREDITS_CREATED), 1);
    assert_eq!(h.metrics.counter(names::CREDITS_APPROVED), 1);
    assert_eq!(h.metrics.duration_count(names::QUEUE_WAIT), 1);
    assert_eq!(h.metrics.duration_count(names::PROCESSING_DURATION), 1);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_submit_sync_runs_same_routine() {
    let h = Harness::new();

    let credit = h
        .processor
        .submit_sync(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();

    assert_eq!(credit.status, CreditStatus::Approved);
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 0);
    assert_eq!(h.publisher.len(), 2);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_no_rules_leaves_credit_pending() {
    let h = Harness::build(vec![], InMemoryCache::new(), ProcessorConfig::default());

    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();

    assert_eq!(credit.status, CreditStatus::Pending);
    assert_eq!(
        h.publisher.event_types_for(&credit.id),
        vec![EventType::CreditCreated]
    );
    assert_eq!(h.metrics.counter(names::CREDITS_APPROVED), 0);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_invalid_input_is_rejected_without_storage_calls() {
    let h = Harness::new();
    let mut inputs = vec![
        TestDataGenerator::inverted_credit_input("c1", "b1"),
        TestDataGenerator::credit_input("", "b1"),
        TestDataGenerator::credit_input("c1", ""),
    ];
    let mut zero_term = TestDataGenerator::credit_input("c1", "b1");
    zero_term.term_months = 0;
    inputs.push(zero_term);

    for input in inputs {
        let err = h.processor.submit(&ctx(), input.clone()).await.unwrap_err();
        assert!(matches!(err, CreditError::InvalidInput(_)), "submit: {err:?}");

        let err = h.processor.submit_sync(&ctx(), input).await.unwrap_err();
        assert!(matches!(err, CreditError::InvalidInput(_)), "submit_sync: {err:?}");
    }

    assert_eq!(h.storage_calls(), 0);
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 0);
    assert!(h.publisher.is_empty());

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_missing_client_and_bank() {
    let h = Harness::new();

    let err = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("nobody", "b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::ClientNotFound(ref id) if id == "nobody"));
    assert_eq!(h.banks.call_count(), 0);

    let err = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::BankNotFound(ref id) if id == "nowhere"));

    assert_eq!(h.credits.call_count(), 0);
    assert!(h.publisher.is_empty());
    assert_eq!(h.metrics.counter(names::PROCESSING_FAILURES), 2);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_storage_failure_propagates() {
    let h = Harness::new();
    h.credits.set_failing(true);

    let err = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::Persistence(_)));
    assert!(h.publisher.is_empty());

    h.processor.shutdown().await;
}

// ==================== 尽力而为的副作用 ====================

#[tokio::test]
async fn test_publish_failure_does_not_change_result() {
    let h = Harness::new();
    h.publisher.set_failing(true);

    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();

    assert_eq!(credit.status, CreditStatus::Approved);
    assert!(h.publisher.is_empty());
    assert_eq!(h.metrics.counter(names::EVENT_PUBLISH_FAILURES), 2);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_cache_failure_does_not_change_result() {
    let h = Harness::new();
    h.cache.set_failing(true);

    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();

    assert_eq!(credit.status, CreditStatus::Approved);
    assert_eq!(h.metrics.counter(names::CACHE_ERRORS), 1);

    // 缓存不可用时读取回源存储
    let fetched = h.processor.get_by_id(&ctx(), &credit.id).await.unwrap();
    assert_eq!(fetched, Some(credit));

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_approval_failure_keeps_pending() {
    let h = Harness::new();
    h.credits.set_fail_status_updates(true);

    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();

    assert_eq!(credit.status, CreditStatus::Pending);
    assert_eq!(
        h.publisher.event_types_for(&credit.id),
        vec![EventType::CreditCreated]
    );
    assert_eq!(h.metrics.counter(names::CREDITS_APPROVED), 0);

    h.processor.shutdown().await;
}

// ==================== 读取路径 ====================

#[tokio::test]
async fn test_get_by_id_is_served_from_cache_when_storage_fails() {
    let h = Harness::new();
    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();

    h.credits.set_failing(true);
    let calls_before = h.credits.call_count();

    let cached = h.processor.get_by_id(&ctx(), &credit.id).await.unwrap();
    assert_eq!(cached, Some(credit));
    assert_eq!(h.credits.call_count(), calls_before);
    assert_eq!(h.metrics.counter(names::CACHE_HITS), 1);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_corrupt_cache_entries_fall_back_to_storage() {
    let h = Harness::new();
    h.credits.insert(stored_credit("cr-1", "c1", 0));
    h.credits.insert(stored_credit("cr-2", "c1", 0));

    h.cache.insert_raw(&CacheKey::credit("cr-1"), "{not json");
    h.cache
        .insert_raw(&CacheKey::credit("cr-2"), r#"{"status":"APPROVED"}"#);

    let first = h.processor.get_by_id(&ctx(), "cr-1").await.unwrap().unwrap();
    assert_eq!(first.status, CreditStatus::Pending);
    assert_eq!(h.metrics.counter(names::CACHE_ERRORS), 1);

    // 缓存里没有 id 的记录视为未命中
    let second = h.processor.get_by_id(&ctx(), "cr-2").await.unwrap().unwrap();
    assert_eq!(second.id, "cr-2");
    assert_eq!(second.status, CreditStatus::Pending);
    assert_eq!(h.metrics.counter(names::CACHE_MISSES), 1);
    assert_eq!(h.metrics.counter(names::CACHE_HITS), 0);

    assert!(h.processor.get_by_id(&ctx(), "cr-404").await.unwrap().is_none());

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_cache_without_json_capability_is_bypassed() {
    let h = Harness::build(
        vec![Arc::new(PaymentRangeRule) as Arc<dyn Rule>],
        InMemoryCache::without_json(),
        ProcessorConfig::default(),
    );

    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();
    assert!(!h.cache.contains_key(&CacheKey::credit(&credit.id)));

    let fetched = h.processor.get_by_id(&ctx(), &credit.id).await.unwrap();
    assert_eq!(fetched.map(|c| c.id), Some(credit.id));
    assert_eq!(h.metrics.counter(names::CACHE_HITS), 0);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_list_uses_default_page_size() {
    let h = Harness::new();
    for i in 0..25 {
        let client_id = if i % 5 == 0 { "c2" } else { "c1" };
        h.credits
            .insert(stored_credit(&format!("cr-{i:02}"), client_id, i));
    }

    let first_page = h.processor.list(&ctx(), 0, 0).await.unwrap();
    assert_eq!(first_page.len(), 20);
    assert_eq!(first_page[0].id, "cr-00");

    let tail = h.processor.list(&ctx(), -1, 20).await.unwrap();
    assert_eq!(tail.len(), 5);

    let by_client = h
        .processor
        .list_by_client_id(&ctx(), "c2", 2, 1)
        .await
        .unwrap();
    let ids: Vec<_> = by_client.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["cr-05", "cr-10"]);

    h.processor.shutdown().await;
}

// ==================== 状态维护 ====================

#[tokio::test]
async fn test_update_status_on_unknown_id_touches_nothing() {
    let h = Harness::new();
    let cache_ops = h.cache.operation_count();

    let result = h
        .processor
        .update_status(&ctx(), "missing", CreditStatus::Approved)
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(h.publisher.is_empty());
    assert_eq!(h.cache.operation_count(), cache_ops);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_update_status_publishes_and_invalidates() {
    let h = Harness::build(vec![], InMemoryCache::new(), ProcessorConfig::default());
    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();
    let key = CacheKey::credit(&credit.id);
    assert!(h.cache.contains_key(&key));

    let rejected = h
        .processor
        .update_status(&ctx(), &credit.id, CreditStatus::Rejected)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(rejected.status, CreditStatus::Rejected);
    assert!(!h.cache.contains_key(&key));
    assert_eq!(
        h.publisher.event_types_for(&credit.id),
        vec![EventType::CreditCreated, EventType::CreditRejected]
    );
    assert_eq!(h.metrics.counter(names::CREDITS_REJECTED), 1);

    // 失效后重新读取得到最新状态
    let fetched = h.processor.get_by_id(&ctx(), &credit.id).await.unwrap();
    assert_eq!(fetched.map(|c| c.status), Some(CreditStatus::Rejected));

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_update_and_soft_delete_invalidate_cache() {
    let h = Harness::new();
    let credit = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();
    let key = CacheKey::credit(&credit.id);

    let bad = UpdateCreditInput {
        min_payment: 900.0,
        max_payment: 100.0,
        term_months: 12,
        status: CreditStatus::Approved,
    };
    assert!(matches!(
        h.processor.update(&ctx(), &credit.id, &bad).await,
        Err(CreditError::InvalidInput(_))
    ));
    assert!(h.cache.contains_key(&key));

    let terms = UpdateCreditInput {
        min_payment: 150.0,
        max_payment: 300.0,
        term_months: 36,
        status: CreditStatus::Approved,
    };
    let updated = h
        .processor
        .update(&ctx(), &credit.id, &terms)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.term_months, 36);
    assert!(!h.cache.contains_key(&key));

    let inactive = h
        .processor
        .deactivate(&ctx(), &credit.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!inactive.is_active);
    assert_eq!(inactive.status, CreditStatus::Approved);

    let active = h
        .processor
        .reactivate(&ctx(), &credit.id)
        .await
        .unwrap()
        .unwrap();
    assert!(active.is_active);

    assert!(h.processor.deactivate(&ctx(), "missing").await.unwrap().is_none());

    h.processor.shutdown().await;
}

// ==================== 并发校验 ====================

#[tokio::test]
async fn test_validate_eligibility_concurrent() {
    let h = Harness::new();

    let result = h
        .processor
        .validate_eligibility_concurrent(&ctx(), &TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap();
    assert!(result.approved);
    assert_eq!(result.rule_name, PaymentRangeRule::NAME);
    assert_eq!(h.credits.call_count(), 0);

    let err = h
        .processor
        .validate_eligibility_concurrent(&ctx(), &TestDataGenerator::credit_input("x", "y"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::ClientNotFound(_)));

    let err = h
        .processor
        .validate_eligibility_concurrent(&ctx(), &TestDataGenerator::credit_input("c1", "y"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::BankNotFound(_)));

    h.banks.set_failing(true);
    let err = h
        .processor
        .validate_eligibility_concurrent(&ctx(), &TestDataGenerator::credit_input("x", "b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::Persistence(_)));

    h.processor.shutdown().await;
}

// ==================== 并发与生命周期 ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions() {
    let h = Harness::new();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let processor = h.processor.clone();
            tokio::spawn(async move {
                processor
                    .submit(
                        &RequestContext::background(),
                        TestDataGenerator::credit_input("c1", "b1"),
                    )
                    .await
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        let credit = task.await.unwrap().unwrap();
        assert_eq!(credit.status, CreditStatus::Approved);
        assert_eq!(
            h.publisher.event_types_for(&credit.id),
            vec![EventType::CreditCreated, EventType::CreditApproved]
        );
        ids.insert(credit.id);
    }

    assert_eq!(ids.len(), 32);
    assert_eq!(h.credits.len(), 32);
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 32);

    h.processor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_rejects_new_jobs() {
    let h = Harness::new();
    assert!(h.processor.is_running());

    h.processor.shutdown().await;
    h.processor.shutdown().await;
    tokio::join!(h.processor.shutdown(), h.processor.shutdown());
    assert!(!h.processor.is_running());

    let err = h
        .processor
        .submit(&ctx(), TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::ProcessorStopped));
    assert_eq!(h.storage_calls(), 0);
}

#[tokio::test]
async fn test_canceled_context_never_enqueues() {
    let h = Harness::new();
    let (canceled, handle) = RequestContext::with_cancel();
    handle.cancel();

    let err = h
        .processor
        .submit(&canceled, TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::Canceled));
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 0);

    h.processor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_job_still_completes() {
    let h = Harness::new();
    h.clients.set_latency(Duration::from_secs(2));

    let deadline = RequestContext::with_timeout(Duration::from_millis(100));
    let err = h
        .processor
        .submit(&deadline, TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::DeadlineExceeded));
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 1);

    // worker 使用与调用方脱钩的上下文，任务照常完成
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.credits.len(), 1);
    assert_eq!(h.publisher.len(), 2);

    h.processor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_sync_honors_deadline() {
    let h = Harness::new();
    h.banks.set_latency(Duration::from_secs(2));

    let deadline = RequestContext::with_timeout(Duration::from_millis(100));
    let err = h
        .processor
        .submit_sync(&deadline, TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::DeadlineExceeded));
    assert!(h.credits.is_empty());

    h.processor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_and_shutdown_drop_pending_jobs() {
    let h = Harness::build(
        vec![Arc::new(PaymentRangeRule) as Arc<dyn Rule>],
        InMemoryCache::new(),
        ProcessorConfig {
            workers: 1,
            queue_capacity: 1,
            ..Default::default()
        },
    );
    h.clients.set_latency(Duration::from_secs(10));

    // 第一个任务被 worker 取走后阻塞在慢查询上
    let in_flight = {
        let processor = h.processor.clone();
        tokio::spawn(async move {
            processor
                .submit(&RequestContext::background(), TestDataGenerator::credit_input("c1", "b1"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // 第二个任务占满队列
    let queued = {
        let processor = h.processor.clone();
        tokio::spawn(async move {
            processor
                .submit(&RequestContext::background(), TestDataGenerator::credit_input("c1", "b1"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 2);

    // 第三个任务在入队阶段超时
    let deadline = RequestContext::with_timeout(Duration::from_millis(100));
    let err = h
        .processor
        .submit(&deadline, TestDataGenerator::credit_input("c1", "b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::DeadlineExceeded));
    assert_eq!(h.metrics.counter(names::JOBS_ENQUEUED), 2);

    // 停止后正在处理的任务完成，队列中的任务不再被取走
    h.processor.shutdown().await;

    let first = in_flight.await.unwrap().unwrap();
    assert_eq!(first.status, CreditStatus::Approved);

    let second = queued.await.unwrap();
    assert!(matches!(second, Err(CreditError::ProcessorStopped)));
    assert_eq!(h.credits.len(), 1);
}
