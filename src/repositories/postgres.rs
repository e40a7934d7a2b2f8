use async_trait::async_trait;
use sqlx::PgPool;

use super::{Queries, TableName, TokenStore};
use crate::models::{NewToken, Token};

#[derive(Clone)]
pub struct PgTokenRepository {
    pool: PgPool,
    table: TableName,
    queries: Queries,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool, table: TableName) -> Self {
        let queries = Queries::build(&table, |n| format!("${}", n));
        Self {
            pool,
            table,
            queries,
        }
    }
}

#[async_trait]
impl TokenStore for PgTokenRepository {
    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                model_name VARCHAR(255) NOT NULL,
                model_id VARCHAR(255) NOT NULL,
                token VARCHAR(255) NOT NULL,
                uses_allowed BIGINT NOT NULL DEFAULT 0,
                uses_remaining BIGINT NOT NULL DEFAULT 0,
                expires BIGINT NOT NULL DEFAULT 0,
                created BIGINT NOT NULL
            )
            "#,
            table = self.table
        );

        sqlx::query(&create_table).execute(&self.pool).await?;
        sqlx::query(&self.queries.create_index)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert(&self, token: &NewToken<'_>) -> Result<Token, sqlx::Error> {
        sqlx::query_as::<_, Token>(&self.queries.insert)
            .bind(token.model_name)
            .bind(token.model_id)
            .bind(token.token_hash)
            .bind(token.uses_allowed)
            .bind(token.uses_remaining())
            .bind(token.expires)
            .bind(token.created)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_latest(
        &self,
        model_name: &str,
        model_id: &str,
    ) -> Result<Option<Token>, sqlx::Error> {
        sqlx::query_as::<_, Token>(&self.queries.find_latest)
            .bind(model_name)
            .bind(model_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn decrement_uses(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&self.queries.decrement_uses)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired_or_exhausted(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(&self.queries.purge)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
