use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use super::{RepositoryError, TokenRepository};
use crate::DbPool;

pub struct SqlTokenRepository {
    pool: DbPool,
}

impl SqlTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for SqlTokenRepository {
    async fn set_access_token(
        &self,
        user_id: &str,
        token: SecretString,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_access_token (user_id, access_token, updated_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 access_token = excluded.access_token, \
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(token.expose_secret())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn access_token(&self, user_id: &str) -> Result<Option<SecretString>, RepositoryError> {
        let token = sqlx::query_scalar::<_, String>(
            "SELECT access_token FROM user_access_token WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.map(SecretString::from))
    }
}
