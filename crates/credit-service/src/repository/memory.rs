//! 内存仓储实现
//!
//! 开发模式（未启用数据库）下的默认存储，也是集成测试的替身：
//! 支持注入失败、模拟延迟并统计调用次数。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use credit_shared::error::SharedError;
use credit_shared::models::{
    Bank, Client, CreateBankInput, CreateClientInput, CreateCreditInput, Credit, CreditStatus,
    Pagination, UpdateBankInput, UpdateClientInput, UpdateCreditInput,
};

use super::traits::{BankRepository, ClientRepository, CreditRepository};
use crate::context::RequestContext;
use crate::error::{CreditError, Result};

/// 三个内存仓储共用的故障注入与调用统计
#[derive(Debug, Default)]
struct Probe {
    calls: AtomicUsize,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl Probe {
    /// 每次仓储调用的入口：计数、检查上下文、按配置延迟或失败
    async fn enter(&self, ctx: &RequestContext, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            ctx.run(async {
                tokio::time::sleep(Duration::from_millis(latency)).await;
                Ok(())
            })
            .await?;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(CreditError::Persistence(SharedError::Internal(format!(
                "injected storage failure: {op}"
            ))));
        }
        Ok(())
    }
}

fn paginate<T>(mut items: Vec<T>, page: Pagination) -> Vec<T> {
    let offset = usize::try_from(page.offset).unwrap_or(0);
    let limit = usize::try_from(page.limit).unwrap_or(0);
    if offset >= items.len() {
        return Vec::new();
    }
    items.drain(..offset);
    items.truncate(limit);
    items
}

macro_rules! probe_accessors {
    () => {
        /// 累计调用次数（含失败的调用）
        pub fn call_count(&self) -> usize {
            self.probe.calls.load(Ordering::SeqCst)
        }

        /// 之后的调用全部返回持久化错误
        pub fn set_failing(&self, failing: bool) {
            self.probe.failing.store(failing, Ordering::SeqCst);
        }

        /// 每次调用前等待的时长
        pub fn set_latency(&self, latency: Duration) {
            let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
            self.probe.latency_ms.store(millis, Ordering::SeqCst);
        }
    };
}

// ==================== 客户 ====================

#[derive(Debug, Default)]
pub struct InMemoryClientRepository {
    clients: DashMap<String, Client>,
    probe: Probe,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入，不经过调用统计
    pub fn insert(&self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    probe_accessors!();
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn create(&self, ctx: &RequestContext, input: &CreateClientInput) -> Result<Client> {
        self.probe.enter(ctx, "client.create").await?;
        let client = Client {
            id: Uuid::new_v4().to_string(),
            full_name: input.full_name.clone(),
            email: input.email.clone(),
            birth_date: input.birth_date,
            country: input.country.clone(),
            created_at: Utc::now(),
            is_active: true,
        };
        self.clients.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Client>> {
        self.probe.enter(ctx, "client.get_by_id").await?;
        Ok(self.clients.get(id).map(|c| c.clone()))
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateClientInput,
    ) -> Result<Option<Client>> {
        self.probe.enter(ctx, "client.update").await?;
        Ok(self.clients.get_mut(id).map(|mut client| {
            client.full_name = input.full_name.clone();
            client.email = input.email.clone();
            client.birth_date = input.birth_date;
            client.country = input.country.clone();
            client.clone()
        }))
    }

    async fn set_active(
        &self,
        ctx: &RequestContext,
        id: &str,
        active: bool,
    ) -> Result<Option<Client>> {
        self.probe.enter(ctx, "client.set_active").await?;
        Ok(self.clients.get_mut(id).map(|mut client| {
            client.is_active = active;
            client.clone()
        }))
    }

    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Client>> {
        self.probe.enter(ctx, "client.list").await?;
        let mut clients: Vec<Client> = self.clients.iter().map(|c| c.clone()).collect();
        clients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(clients, page))
    }
}

// ==================== 银行 ====================

#[derive(Debug, Default)]
pub struct InMemoryBankRepository {
    banks: DashMap<String, Bank>,
    probe: Probe,
}

impl InMemoryBankRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bank: Bank) {
        self.banks.insert(bank.id.clone(), bank);
    }

    probe_accessors!();
}

#[async_trait]
impl BankRepository for InMemoryBankRepository {
    async fn create(&self, ctx: &RequestContext, input: &CreateBankInput) -> Result<Bank> {
        self.probe.enter(ctx, "bank.create").await?;
        let bank = Bank {
            id: Uuid::new_v4().to_string(),
            name: input.name.clone(),
            bank_type: input.bank_type,
            is_active: true,
        };
        self.banks.insert(bank.id.clone(), bank.clone());
        Ok(bank)
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Bank>> {
        self.probe.enter(ctx, "bank.get_by_id").await?;
        Ok(self.banks.get(id).map(|b| b.clone()))
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateBankInput,
    ) -> Result<Option<Bank>> {
        self.probe.enter(ctx, "bank.update").await?;
        Ok(self.banks.get_mut(id).map(|mut bank| {
            bank.name = input.name.clone();
            bank.bank_type = input.bank_type;
            bank.clone()
        }))
    }

    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool) -> Result<Option<Bank>> {
        self.probe.enter(ctx, "bank.set_active").await?;
        Ok(self.banks.get_mut(id).map(|mut bank| {
            bank.is_active = active;
            bank.clone()
        }))
    }

    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Bank>> {
        self.probe.enter(ctx, "bank.list").await?;
        // 银行没有创建时间字段，按名称排序
        let mut banks: Vec<Bank> = self.banks.iter().map(|b| b.clone()).collect();
        banks.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(banks, page))
    }
}

// ==================== 信贷申请 ====================

#[derive(Debug, Default)]
pub struct InMemoryCreditRepository {
    credits: DashMap<String, Credit>,
    probe: Probe,
    fail_status_updates: AtomicBool,
}

impl InMemoryCreditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, credit: Credit) {
        self.credits.insert(credit.id.clone(), credit);
    }

    /// 直接读取存储内容，不经过调用统计
    pub fn snapshot(&self, id: &str) -> Option<Credit> {
        self.credits.get(id).map(|c| c.clone())
    }

    pub fn len(&self) -> usize {
        self.credits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
    }

    /// 只让 `update_status` 失败，其余操作正常
    pub fn set_fail_status_updates(&self, failing: bool) {
        self.fail_status_updates.store(failing, Ordering::SeqCst);
    }

    probe_accessors!();

    fn sorted(&self, filter: impl Fn(&Credit) -> bool) -> Vec<Credit> {
        let mut credits: Vec<Credit> = self
            .credits
            .iter()
            .filter(|c| filter(c.value()))
            .map(|c| c.clone())
            .collect();
        credits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        credits
    }
}

#[async_trait]
impl CreditRepository for InMemoryCreditRepository {
    async fn create(&self, ctx: &RequestContext, input: &CreateCreditInput) -> Result<Credit> {
        self.probe.enter(ctx, "credit.create").await?;
        let credit = Credit {
            id: Uuid::new_v4().to_string(),
            client_id: input.client_id.clone(),
            bank_id: input.bank_id.clone(),
            min_payment: input.min_payment,
            max_payment: input.max_payment,
            term_months: input.term_months,
            credit_type: input.credit_type,
            status: CreditStatus::Pending,
            created_at: Utc::now(),
            is_active: true,
        };
        self.credits.insert(credit.id.clone(), credit.clone());
        Ok(credit)
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Credit>> {
        self.probe.enter(ctx, "credit.get_by_id").await?;
        Ok(self.snapshot(id))
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateCreditInput,
    ) -> Result<Option<Credit>> {
        self.probe.enter(ctx, "credit.update").await?;
        Ok(self.credits.get_mut(id).map(|mut credit| {
            credit.min_payment = input.min_payment;
            credit.max_payment = input.max_payment;
            credit.term_months = input.term_months;
            credit.status = input.status;
            credit.clone()
        }))
    }

    async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: CreditStatus,
    ) -> Result<Option<Credit>> {
        self.probe.enter(ctx, "credit.update_status").await?;
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(CreditError::Persistence(SharedError::Internal(
                "injected status update failure".to_string(),
            )));
        }
        Ok(self.credits.get_mut(id).map(|mut credit| {
            credit.status = status;
            credit.clone()
        }))
    }

    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool) -> Result<Option<Credit>> {
        self.probe.enter(ctx, "credit.set_active").await?;
        Ok(self.credits.get_mut(id).map(|mut credit| {
            credit.is_active = active;
            credit.clone()
        }))
    }

    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Credit>> {
        self.probe.enter(ctx, "credit.list").await?;
        Ok(paginate(self.sorted(|_| true), page))
    }

    async fn list_by_client_id(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        page: Pagination,
    ) -> Result<Vec<Credit>> {
        self.probe.enter(ctx, "credit.list_by_client_id").await?;
        Ok(paginate(self.sorted(|c| c.client_id == client_id), page))
    }
}
