//! 客户维护服务

use std::sync::Arc;

use tracing::{info, instrument};
use validator::Validate;

use credit_shared::models::{Client, CreateClientInput, Pagination, UpdateClientInput};

use crate::context::RequestContext;
use crate::error::Result;
use crate::repository::ClientRepository;

pub struct ClientService {
    repo: Arc<dyn ClientRepository>,
    default_page_size: i64,
}

impl ClientService {
    pub fn new(repo: Arc<dyn ClientRepository>, default_page_size: i64) -> Self {
        Self {
            repo,
            default_page_size,
        }
    }

    #[instrument(skip(self, ctx, input), fields(email = %input.email))]
    pub async fn create(&self, ctx: &RequestContext, input: &CreateClientInput) -> Result<Client> {
        input.validate()?;
        let client = self.repo.create(ctx, input).await?;
        info!(client_id = %client.id, "客户已创建");
        Ok(client)
    }

    pub async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Client>> {
        self.repo.get_by_id(ctx, id).await
    }

    #[instrument(skip(self, ctx, input))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateClientInput,
    ) -> Result<Option<Client>> {
        input.validate()?;
        self.repo.update(ctx, id, input).await
    }

    #[instrument(skip(self, ctx))]
    pub async fn deactivate(&self, ctx: &RequestContext, id: &str) -> Result<Option<Client>> {
        self.repo.set_active(ctx, id, false).await
    }

    #[instrument(skip(self, ctx))]
    pub async fn reactivate(&self, ctx: &RequestContext, id: &str) -> Result<Option<Client>> {
        self.repo.set_active(ctx, id, true).await
    }

    pub async fn list(&self, ctx: &RequestContext, limit: i64, offset: i64) -> Result<Vec<Client>> {
        let page = Pagination::with_default(limit, offset, self.default_page_size);
        self.repo.list(ctx, page).await
    }
}
