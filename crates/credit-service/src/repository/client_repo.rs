//! 客户仓储（PostgreSQL）

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use credit_shared::models::{Client, CreateClientInput, Pagination, UpdateClientInput};

use super::traits::ClientRepository;
use crate::context::RequestContext;
use crate::error::Result;

const CLIENT_COLUMNS: &str = "id, full_name, email, birth_date, country, created_at, is_active";

pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn create(&self, ctx: &RequestContext, input: &CreateClientInput) -> Result<Client> {
        let sql = format!(
            "INSERT INTO clients (id, full_name, email, birth_date, country) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {CLIENT_COLUMNS}"
        );
        ctx.run(async {
            let client = sqlx::query_as::<_, Client>(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(&input.full_name)
                .bind(&input.email)
                .bind(input.birth_date)
                .bind(&input.country)
                .fetch_one(&self.pool)
                .await?;
            Ok(client)
        })
        .await
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Option<Client>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1");
        ctx.run(async {
            let client = sqlx::query_as::<_, Client>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(client)
        })
        .await
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: &UpdateClientInput,
    ) -> Result<Option<Client>> {
        let sql = format!(
            "UPDATE clients SET full_name = $1, email = $2, birth_date = $3, country = $4, \
             updated_at = NOW() WHERE id = $5 RETURNING {CLIENT_COLUMNS}"
        );
        ctx.run(async {
            let client = sqlx::query_as::<_, Client>(&sql)
                .bind(&input.full_name)
                .bind(&input.email)
                .bind(input.birth_date)
                .bind(&input.country)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(client)
        })
        .await
    }

    async fn set_active(
        &self,
        ctx: &RequestContext,
        id: &str,
        active: bool,
    ) -> Result<Option<Client>> {
        let sql = format!(
            "UPDATE clients SET is_active = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {CLIENT_COLUMNS}"
        );
        ctx.run(async {
            let client = sqlx::query_as::<_, Client>(&sql)
                .bind(active)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(client)
        })
        .await
    }

    async fn list(&self, ctx: &RequestContext, page: Pagination) -> Result<Vec<Client>> {
        let sql = format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2"
        );
        ctx.run(async {
            let clients = sqlx::query_as::<_, Client>(&sql)
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?;
            Ok(clients)
        })
        .await
    }
}
