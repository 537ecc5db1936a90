use crate::error::Result;
use aegis_models::SigningKey;
use sqlx::PgPool;

#[derive(Clone)]
pub struct KeyRepository {
    pool: PgPool,
}

impl KeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, key: &SigningKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signing_keys (kid, algorithm, public_key_pem, private_key_pem, is_active, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kid) DO NOTHING
            "#,
        )
        .bind(&key.kid)
        .bind(&key.algorithm)
        .bind(&key.public_key_pem)
        .bind(&key.private_key_pem)
        .bind(key.is_active)
        .bind(key.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All keys still usable for verification: active signers plus retired
    /// keys that have not reached their expiry. Tokens signed under a retired
    /// key stay valid to natural expiry.
    pub async fn list_usable(&self) -> Result<Vec<SigningKey>> {
        let keys = sqlx::query_as::<_, SigningKey>(
            r#"
            SELECT * FROM signing_keys
            WHERE expires_at IS NULL OR expires_at > NOW()
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Mark one key active for signing and retire the others. Retired keys
    /// get a 30-day decoding tail, the longest outstanding token lifetime.
    pub async fn set_active(&self, kid: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE signing_keys
            SET is_active = false,
                expires_at = COALESCE(expires_at, NOW() + INTERVAL '30 days')
            WHERE kid <> $1 AND is_active = true
            "#,
        )
        .bind(kid)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE signing_keys SET is_active = true WHERE kid = $1")
            .bind(kid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
