//! 信贷申请仓储（PostgreSQL）

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use credit_shared::models::{CreateCreditInput, Credit, CreditStatus, Pagination, UpdateCreditInput};

use super::traits::CreditRepository;
use crate::context::RequestContext;
use crate::error::Result;

const CREDIT_COLUMNS: &str = "id, client_id, bank_id, min_payment, max_payment, term_months, \
                              credit_type, status, created_at, is_active";

pub struct PgCreditRepository {
    pool: PgPool,
}

impl PgCreditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_optional(&self, sql: &str, id: &str) -> Result<Option<Credit>> {
        let credit = sqlx::query_as::<_, Credit>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(credit)
    }
}

#[async_trait]
impl CreditRepository for PgCreditRepository {
    async fn create(&self, ctx: &RequestContext, input: &CreateCreditInput) -> Result<Credit> {
        let sql = format!(
            "INSERT INTO credits (id, client_id, bank_id, min_payment, max_payment, term_months, \
             credit_type, status) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {CREDIT_COLUMNS}"
        );
        ctx.run(async {
            let credit = sqlx::query_as::<_, Credit>(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(&input.client_id)
                .bind(&input.bank_id)
                .bind(input.min_payment)
                .bind(input.max_payment)
                .bind(input.term_months)
                .bind(input.credit_type)
                .bind(CreditStatus::Pending)
                .fetch_one(&self.pool)
                .await?;
            Ok(credit)
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Credit>> {
        let sql = format!("SELECT {CREDIT_COLUMNS} FROM credits WHERE id = $1");
        ctx.run(self.fetch_optional(&sql, id)).await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateCreditInput,
    ) -> Result<Option<Credit>> {
        let sql = format!(
            "UPDATE credits SET min_payment = $1, max_payment = $2, term_months = $3, status = $4, \
             updated_at = NOW() WHERE id = $5 RETURNING {CREDIT_COLUMNS}"
        );
        ctx.run(async {
            let credit = sqlx::query_as::<_, Credit>(&sql)
                .bind(input.min_payment)
                .bind(input.max_payment)
                .bind(input.term_months)
                .bind(input.status)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(credit)
        })
        .await
    }

    async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: CreditStatus,
    ) -> Result<Option<Credit>> {
        let sql = format!(
            "UPDATE credits SET status = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {CREDIT_COLUMNS}"
        );
        ctx.run(async {
            let credit = sqlx::query_as::<_, Credit>(&sql)
                .bind(status)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(credit)
        })
        .await
    }

    async fn set_active(&self, ctx: &RequestContext, id: &str, active: bool) -> Result<Option<Credit>> {
        let sql = format!(
            "UPDATE credits SET is_active = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {CREDIT_COLUMNS}"
        );
        ctx.run(async {
            let credit = sqlx::query_as::<_, Credit>(&sql)
                .bind(active)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(credit)
        })
        .await
    }

    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Credit>> {
        let sql = format!(
            "SELECT {CREDIT_COLUMNS} FROM credits ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2"
        );
        ctx.run(async {
            let credits = sqlx::query_as::<_, Credit>(&sql)
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?;
            Ok(credits)
        })
        .await
    }

    async fn list_by_client_id(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        page: Pagination,
    ) -> Result<Vec<Credit>> {
        let sql = format!(
            "SELECT {CREDIT_COLUMNS} FROM credits WHERE client_id = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
        );
        ctx.run(async {
            let credits = sqlx::query_as::<_, Credit>(&sql)
                .bind(client_id)
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?;
            Ok(credits)
        })
        .await
    }
}
