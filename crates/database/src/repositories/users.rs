use crate::error::{DatabaseError, Result};
use aegis_models::{NewUser, User};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a user. `password_hash` is None for social-only accounts.
    pub async fn create(&self, new_user: &NewUser, password_hash: Option<&str>) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (tenant_id, email, username, password_hash, first_name, last_name, groups, scopes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new_user.tenant_id)
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(password_hash)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.groups)
        .bind(&new_user.scopes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return DatabaseError::duplicate("User", &new_user.email);
                }
            }
            DatabaseError::from(e)
        })?;

        Ok(user)
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("User", &id.to_string()))
    }

    /// Email is unique per tenant; all reads are tenant-scoped.
    pub async fn find_by_email(&self, tenant_id: Uuid, email: &str) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE tenant_id = $1 AND email = $2")
            .bind(tenant_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::not_found("User", email))
    }

    pub async fn find_by_email_opt(&self, tenant_id: Uuid, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE tenant_id = $1 AND email = $2",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn update_last_login(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Two-factor state
    // ------------------------------------------------------------------

    /// Stage a pending secret during enrollment. The active secret is
    /// untouched until the user confirms with a valid code.
    pub async fn stage_mfa_secret(&self, id: Uuid, secret: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET mfa_pending_secret = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(secret)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Promote the pending secret: setup_pending -> enabled.
    pub async fn activate_mfa(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET mfa_enabled = true,
                mfa_secret = mfa_pending_secret,
                mfa_pending_secret = NULL,
                updated_at = NOW()
            WHERE id = $1 AND mfa_pending_secret IS NOT NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::InvalidInput(
                "no pending two-factor enrollment".to_string(),
            ));
        }

        Ok(())
    }

    /// enabled -> disabled. Clears both secrets.
    pub async fn disable_mfa(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET mfa_enabled = false,
                mfa_secret = NULL,
                mfa_pending_secret = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_scopes(&self, id: Uuid, scopes: &[String]) -> Result<()> {
        sqlx::query("UPDATE users SET scopes = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(scopes)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn add_group(&self, id: Uuid, group: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET groups = array_append(groups, $2), updated_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(groups))
            "#,
        )
        .bind(id)
        .bind(group)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
