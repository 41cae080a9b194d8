//! 银行仓储（PostgreSQL）

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use credit_shared::models::{Bank, CreateBankInput, Pagination, UpdateBankInput};

use super::traits::BankRepository;
use crate::context::RequestContext;
use crate::error::Result;

const BANK_COLUMNS: &str = "id, name, bank_type, is_active";

pub struct PgBankRepository {
    pool: PgPool,
}

impl PgBankRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BankRepository for PgBankRepository {
    async fn create(&self, ctx: &RequestContext, input: &CreateBankInput) -> Result<Bank> {
        let sql = format!(
            "INSERT INTO banks (id, name, bank_type) VALUES ($1, $2, $3) RETURNING {BANK_COLUMNS}"
        );
        ctx.run(async {
            let bank = sqlx::query_as::<_, Bank>(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(&input.name)
                .bind(input.bank_type)
                .fetch_one(&self.pool)
                .await?;
            Ok(bank)
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Bank>> {
        let sql = format!("SELECT {BANK_COLUMNS} FROM banks WHERE id = $1");
        ctx.run(async {
            let bank = sqlx::query_as::<_, Bank>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(bank)
        })
        .await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateBankInput,
    ) -> Result<Option<Bank>> {
        let sql = format!(
            "UPDATE banks SET name = $1, bank_type = $2, updated_at = NOW() \
             WHERE id = $3 RETURNING {BANK_COLUMNS}"
        );
        ctx.run(async {
            let bank = sqlx::query_as::<_, Bank>(&sql)
                .bind(&input.name)
                .bind(input.bank_type)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(bank)
        })
        .await
    }

    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool) -> Result<Option<Bank>> {
        let sql = format!(
            "UPDATE banks SET is_active = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {BANK_COLUMNS}"
        );
        ctx.run(async {
            let bank = sqlx::query_as::<_, Bank>(&sql)
                .bind(active)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(bank)
        })
        .await
    }

    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Bank>> {
        let sql = format!(
            "SELECT {BANK_COLUMNS} FROM banks ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2"
        );
        ctx.run(async {
            let banks = sqlx::query_as::<_, Bank>(&sql)
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?;
            Ok(banks)
        })
        .await
    }
}
