//! 信贷生命周期事件
//!
//! 定义三种事件的业务数据结构，并从 `Credit` 构建事件信封。

use chrono::{DateTime, Utc};
use credit_shared::error::Result;
use credit_shared::events::{DomainEvent, EventType};
use credit_shared::models::{Credit, CreditStatus, CreditType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCreatedPayload {
    pub credit_id: String,
    pub client_id: String,
    pub bank_id: String,
    pub credit_type: CreditType,
    /// 事件发出时的状态（决策通过时已是 APPROVED）
    pub status: CreditStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditApprovedPayload {
    pub credit_id: String,
    pub client_id: String,
    pub bank_id: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRejectedPayload {
    pub credit_id: String,
    pub client_id: String,
    pub bank_id: String,
    pub rejected_at: DateTime<Utc>,
}

pub fn credit_created(credit: &Credit) -> Result<DomainEvent> {
    let payload = CreditCreatedPayload {
        credit_id: credit.id.clone(),
        client_id: credit.client_id.clone(),
        bank_id: credit.bank_id.clone(),
        credit_type: credit.credit_type,
        status: credit.status,
        created_at: credit.created_at,
    };
    DomainEvent::new(EventType::CreditCreated, &credit.id, &payload)
}

pub fn credit_approved(credit: &Credit) -> Result<DomainEvent> {
    let payload = CreditApprovedPayload {
        credit_id: credit.id.clone(),
        client_id: credit.client_id.clone(),
        bank_id: credit.bank_id.clone(),
        approved_at: Utc::now(),
    };
    DomainEvent::new(EventType::CreditApproved, &credit.id, &payload)
}

pub fn credit_rejected(credit: &Credit) -> Result<DomainEvent> {
    let payload = CreditRejectedPayload {
        credit_id: credit.id.clone(),
        client_id: credit.client_id.clone(),
        bank_id: credit.bank_id.clone(),
        rejected_at: Utc::now(),
    };
    DomainEvent::new(EventType::CreditRejected, &credit.id, &payload)
}

/// 终态对应的事件，PENDING 没有对应事件
pub fn status_changed(credit: &Credit, status: CreditStatus) -> Option<Result<DomainEvent>> {
    match status {
        CreditStatus::Approved => Some(credit_approved(credit)),
        CreditStatus::Rejected => Some(credit_rejected(credit)),
        CreditStatus::Pending => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit() -> Credit {
        Credit {
            id: "cr-1".to_string(),
            client_id: "c-1".to_string(),
            bank_id: "b-1".to_string(),
            min_payment: 100.0,
            max_payment: 200.0,
            term_months: 6,
            credit_type: CreditType::Mortgage,
            status: CreditStatus::Approved,
            created_at: Utc::now(),
            is_active: true,
        }
    }

    #[test]
    fn test_created_payload_carries_status() {
        let event = credit_created(&credit()).unwrap();
        assert_eq!(event.event_type, EventType::CreditCreated);
        assert_eq!(event.aggregate_id, "cr-1");

        let payload: CreditCreatedPayload = event.payload_as().unwrap();
        assert_eq!(payload.status, CreditStatus::Approved);
        assert_eq!(payload.credit_type, CreditType::Mortgage);
    }

    #[test]
    fn test_status_changed_mapping() {
        let c = credit();
        let approved = status_changed(&c, CreditStatus::Approved).unwrap().unwrap();
        assert_eq!(approved.event_type, EventType::CreditApproved);
        let payload: CreditApprovedPayload = approved.payload_as().unwrap();
        assert_eq!(payload.bank_id, "b-1");

        let rejected = status_changed(&c, CreditStatus::Rejected).unwrap().unwrap();
        assert_eq!(rejected.event_type, EventType::CreditRejected);

        assert!(status_changed(&c, CreditStatus::Pending).is_none());
    }
}
