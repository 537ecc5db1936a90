use crate::error::Result;
use aegis_models::{AccessTokenRecord, CreateRefreshToken, RefreshTokenRecord};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// SHA-256 hex digest; opaque tokens are only stored hashed.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Access token records
    // ------------------------------------------------------------------

    pub async fn record_access_token(
        &self,
        jti: &str,
        tenant_id: Uuid,
        client_id: &str,
        user_id: Option<Uuid>,
        scope: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens (jti, tenant_id, client_id, user_id, scope, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(jti)
        .bind(tenant_id)
        .bind(client_id)
        .bind(user_id)
        .bind(scope)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// A live record: present, unexpired, unrevoked.
    pub async fn find_live_access_token(&self, jti: &str) -> Result<Option<AccessTokenRecord>> {
        let record = sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            SELECT * FROM access_tokens
            WHERE jti = $1 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Idempotent: revoking an already-revoked token is a no-op.
    pub async fn revoke_access_token(&self, jti: &str) -> Result<()> {
        sqlx::query(
            "UPDATE access_tokens SET revoked_at = NOW() WHERE jti = $1 AND revoked_at IS NULL",
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Refresh tokens
    // ------------------------------------------------------------------

    /// Mint an opaque refresh token; the plaintext is returned once.
    pub async fn create_refresh_token(&self, request: &CreateRefreshToken) -> Result<String> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();

        let expires_at = Utc::now() + Duration::seconds(request.expires_in_seconds);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, tenant_id, client_id, user_id, scope, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(hash_token(&token))
        .bind(request.tenant_id)
        .bind(&request.client_id)
        .bind(request.user_id)
        .bind(&request.scope)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    pub async fn find_live_refresh_token(
        &self,
        token: &str,
        client_id: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE token_hash = $1 AND client_id = $2
              AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(hash_token(token))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn touch_refresh_token(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Idempotent revocation keyed by token value.
    pub async fn revoke_refresh_token(&self, token: &str, client_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = NOW()
            WHERE token_hash = $1 AND client_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(hash_token(token))
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_deterministic() {
        let hash1 = hash_token("some-opaque-token");
        let hash2 = hash_token("some-opaque-token");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);

        assert_ne!(hash1, hash_token("different-token"));
    }
}
