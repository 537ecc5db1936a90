use crate::error::{DatabaseError, Result};
use aegis_models::{NewTenant, Tenant, TenantSettings};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &NewTenant) -> Result<Tenant> {
        let settings = request.settings.clone().unwrap_or_default();
        let settings_json = sqlx::types::Json(&settings);

        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, domain, subdomain, is_default, settings)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(&request.domain)
        .bind(&request.subdomain)
        .bind(request.is_default)
        .bind(settings_json)
        .fetch_one(&self.pool)
        .await?;

        Ok(tenant)
    }

    /// Find an active tenant by ID. Inactive (soft-deleted) tenants do not
    /// resolve.
    pub async fn find_active(&self, id: Uuid) -> Result<Tenant> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1 AND is_active = true")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Tenant", &id.to_string()))
    }

    pub async fn find_by_domain(&self, domain: &str) -> Result<Tenant> {
        sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE domain = $1 AND is_active = true",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Tenant", domain))
    }

    pub async fn find_by_subdomain(&self, subdomain: &str) -> Result<Tenant> {
        sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE subdomain = $1 AND is_active = true",
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Tenant", subdomain))
    }

    /// The tenant flagged is_default, if any. At most one row carries the
    /// flag.
    pub async fn find_default(&self) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE is_default = true AND is_active = true LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    pub async fn update_settings(&self, id: Uuid, settings: &TenantSettings) -> Result<Tenant> {
        let settings_json = sqlx::types::Json(settings);

        sqlx::query_as::<_, Tenant>(
            "UPDATE tenants SET settings = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(settings_json)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Tenant", &id.to_string()))
    }

    /// Soft delete: tenants are deactivated, never removed.
    pub async fn deactivate(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE tenants SET is_active = false, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
