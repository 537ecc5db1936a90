use crate::error::{DatabaseError, Result};
use aegis_models::SocialProvider;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct SocialProviderRepository {
    pool: PgPool,
}

impl SocialProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enabled providers only; disabled rows are never offered and never
    /// accept callbacks.
    pub async fn find_enabled(&self, tenant_id: Uuid, name: &str) -> Result<SocialProvider> {
        sqlx::query_as::<_, SocialProvider>(
            r#"
            SELECT * FROM social_providers
            WHERE tenant_id = $1 AND name = $2 AND is_enabled = true
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("SocialProvider", name))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<SocialProvider> {
        sqlx::query_as::<_, SocialProvider>("SELECT * FROM social_providers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("SocialProvider", &id.to_string()))
    }

    pub async fn list_enabled(&self, tenant_id: Uuid) -> Result<Vec<SocialProvider>> {
        let providers = sqlx::query_as::<_, SocialProvider>(
            r#"
            SELECT * FROM social_providers
            WHERE tenant_id = $1 AND is_enabled = true
            ORDER BY display_name
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(providers)
    }
}
