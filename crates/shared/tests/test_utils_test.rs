//! test_utils 与内存适配器的集成测试

use std::sync::Arc;

use chrono::Utc;
use credit_shared::cache::{CacheKey, CacheStore, InMemoryCache, RateLimiter, get_typed, set_typed};
use credit_shared::events::{DomainEvent, EventPublisher, EventType, InMemoryEventPublisher};
use credit_shared::models::{BankType, Credit, CreditStatus};
use credit_shared::test_utils::*;

// ==================== 测试数据生成器测试 ====================

#[test]
fn test_client_generation() {
    let client = TestDataGenerator::client("client-1");
    assert_eq!(client.id, "client-1");
    assert_eq!(client.email, "client-1@example.com");
    assert!(client.is_active);
    TestAssertions::assert_time_within(client.created_at, Utc::now(), chrono::Duration::seconds(5));
}

#[test]
fn test_bank_generation() {
    let bank = TestDataGenerator::bank("bank-1", BankType::Government);
    assert!(bank.is_government());
    assert_eq!(TestDataGenerator::bank("b", BankType::Private).bank_type, BankType::Private);
}

#[test]
fn test_test_configs_point_to_test_instances() {
    let db = test_database_config();
    assert!(db.enabled);
    assert!(db.max_connections <= 5);
    assert!(test_redis_config().url.starts_with("redis://"));
}

// ==================== 缓存与事件组合场景 ====================

#[tokio::test]
async fn test_credit_roundtrip_through_json_cache() {
    let cache = InMemoryCache::new();
    let credit = Credit {
        id: "cr-1".to_string(),
        client_id: "c-1".to_string(),
        bank_id: "b-1".to_string(),
        min_payment: 100.0,
        max_payment: 400.0,
        term_months: 24,
        status: CreditStatus::Approved,
        created_at: Utc::now(),
        is_active: true,
        ..Default::default()
    };

    let key = CacheKey::credit(&credit.id);
    set_typed(cache.as_json().unwrap(), &key, &credit, 300)
        .await
        .unwrap();

    let loaded: Credit = get_typed(cache.as_json().unwrap(), &key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, credit);

    cache.delete(&key).await.unwrap();
    assert!(!cache.contains_key(&key));
}

#[tokio::test]
async fn test_rate_limiter_shares_cache_with_credit_entries() {
    let cache = Arc::new(InMemoryCache::new());
    let limiter = RateLimiter::new(cache.clone(), 3, 60);

    for _ in 0..3 {
        assert!(limiter.allow("client-9").await);
    }
    assert!(!limiter.allow("client-9").await);
    assert!(cache.contains_key(&CacheKey::rate_limit("client-9")));
}

#[tokio::test]
async fn test_publisher_keeps_per_aggregate_order() {
    let publisher = InMemoryEventPublisher::new();
    for id in ["a", "b"] {
        let created = DomainEvent::new(EventType::CreditCreated, id, &serde_json::json!({})).unwrap();
        publisher.publish(created).await.unwrap();
    }
    let approved = DomainEvent::new(EventType::CreditApproved, "a", &serde_json::json!({})).unwrap();
    publisher.publish(approved).await.unwrap();

    assert_eq!(
        publisher.event_types_for("a"),
        vec![EventType::CreditCreated, EventType::CreditApproved]
    );
    assert_eq!(publisher.event_types_for("b"), vec![EventType::CreditCreated]);
}
