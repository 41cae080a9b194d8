//! 仓储 Trait 定义
//!
//! 服务层只依赖这些接口，生产环境注入 PostgreSQL 实现，测试与开发模式注入内存实现。
//! 所有方法都接收调用方的 `RequestContext`，按 ID 查询不到时返回 `None` 而不是错误。

use async_trait::async_trait;

use credit_shared::models::{
    Bank, Client, CreateBankInput, CreateClientInput, CreateCreditInput, Credit, CreditStatus,
    Pagination, UpdateBankInput, UpdateClientInput, UpdateCreditInput,
};

use crate::context::RequestContext;
use crate::error::Result;

/// 客户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, ctx: &RequestContext, input: &CreateClientInput) -> Result<Client>;
    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Client>>;
    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateClientInput,
    ) -> Result<Option<Client>>;
    /// 软删除 / 恢复
    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool)
    -> Result<Option<Client>>;
    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Client>>;
}

/// 银行仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BankRepository: Send + Sync {
    async fn create(&self, ctx: &RequestContext, input: &CreateBankInput) -> Result<Bank>;
    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Bank>>;
    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateBankInput,
    ) -> Result<Option<Bank>>;
    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool)
    -> Result<Option<Bank>>;
    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Bank>>;
}

/// 信贷申请仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CreditRepository: Send + Sync {
    /// 以 PENDING 状态写入新申请，ID 由仓储生成
    async fn create(&self, ctx: &RequestContext, input: &CreateCreditInput) -> Result<Credit>;
    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Credit>>;
    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateCreditInput,
    ) -> Result<Option<Credit>>;
    async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: CreditStatus,
    ) -> Result<Option<Credit>>;
    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool)
    -> Result<Option<Credit>>;
    /// 按创建时间倒序分页
    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Credit>>;
    async fn list_by_client_id(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        page: Pagination,
    ) -> Result<Vec<Credit>>;
}
