use crate::error::Result;
use aegis_models::TwoFactorSession;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

const SESSION_TTL_MINUTES: i64 = 5;

fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct TwoFactorRepository {
    pool: PgPool,
}

impl TwoFactorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Verification sessions
    // ------------------------------------------------------------------

    /// Open a verification session for a login attempt pending its second
    /// factor. Returns the opaque session token (shown once).
    pub async fn create_session(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        client_id: Option<&str>,
    ) -> Result<String> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        let expires_at = Utc::now() + Duration::minutes(SESSION_TTL_MINUTES);

        sqlx::query(
            r#"
            INSERT INTO two_factor_sessions (session_token_hash, tenant_id, user_id, client_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(hash_session_token(&token))
        .bind(tenant_id)
        .bind(user_id)
        .bind(client_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// Unexpired, unverified sessions only; expired sessions fail closed.
    pub async fn find_pending_session(&self, token: &str) -> Result<Option<TwoFactorSession>> {
        let session = sqlx::query_as::<_, TwoFactorSession>(
            r#"
            SELECT * FROM two_factor_sessions
            WHERE session_token_hash = $1 AND verified_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(hash_session_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn mark_session_verified(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE two_factor_sessions SET verified_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Backup codes
    // ------------------------------------------------------------------

    /// Replace the stored set; only happens at (re-)enrollment.
    pub async fn replace_backup_codes(&self, user_id: Uuid, code_hashes: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for hash in code_hashes {
            sqlx::query("INSERT INTO backup_codes (user_id, code_hash) VALUES ($1, $2)")
                .bind(user_id)
                .bind(hash)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    pub async fn list_backup_code_hashes(&self, user_id: Uuid) -> Result<Vec<(Uuid, String)>> {
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, code_hash FROM backup_codes WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    /// Single use: consuming deletes the row, so the set shrinks
    /// monotonically.
    pub async fn consume_backup_code(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM backup_codes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count_backup_codes(&self, user_id: Uuid) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM backup_codes WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    pub async fn delete_backup_codes(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
