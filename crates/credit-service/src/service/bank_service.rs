//! 银行维护服务

use std::sync::Arc;

use tracing::{info, instrument};
use validator::Validate;

use credit_shared::models::{Bank, CreateBankInput, Pagination, UpdateBankInput};

use crate::context::RequestContext;
use crate::error::Result;
use crate::repository::BankRepository;

pub struct BankService {
    repo: Arc<dyn BankRepository>,
    default_page_size: i64,
}

impl BankService {
    pub fn new(repo: Arc<dyn BankRepository>, default_page_size: i64) -> Self {
        Self {
            repo,
            default_page_size,
        }
    }

    #[instrument(skip(self, ctx, input), fields(bank_type = ?input.bank_type))]
    pub async fn create(&self, ctx: &RequestContext, input: &CreateBankInput) -> Result<Bank> {
        input.validate()?;
        let bank = self.repo.create(ctx, input).await?;
        info!(bank_id = %bank.id, "银行已创建");
        Ok(bank)
    }

    pub async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Bank>> {
        self.repo.get_by_id(ctx, id).await
    }

    #[instrument(skip(self, ctx, input))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateBankInput,
    ) -> Result<Option<Bank>> {
        input.validate()?;
        self.repo.update(ctx, id, input).await
    }

    #[instrument(skip(self, ctx))]
    pub async fn deactivate(&self, ctx: &RequestContext, id: &str) -> Result<Option<Bank>> {
        self.repo.set_active(ctx, id, false).await
    }

    #[instrument(skip(self, ctx))]
    pub async fn reactivate(&self, ctx: &RequestContext, id: &str) -> Result<Option<Bank>> {
        self.repo.set_active(ctx, id, true).await
    }

    pub async fn list(&self, ctx: &RequestContext, limit: i64, offset: i64) -> Result<Vec<Bank>> {
        let page = Pagination::with_default(limit, offset, self.default_page_size);
        self.repo.list(ctx, page).await
    }
}
