use crate::error::{DatabaseError, Result};
use aegis_models::{Client, ClientWithSecret, NewClient};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ClientRepository {
    pool: PgPool,
}

impl ClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a client. The plaintext secret is returned once and stored as a
    /// bcrypt hash; confidential clients only.
    pub async fn create(&self, request: &NewClient) -> Result<ClientWithSecret> {
        let client_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();

        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        let secret_hash = if request.client_type == aegis_models::ClientType::Confidential {
            Some(
                bcrypt::hash(&secret, bcrypt::DEFAULT_COST)
                    .map_err(|e| DatabaseError::Other(e.to_string()))?,
            )
        } else {
            None
        };

        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (tenant_id, name, client_id, client_secret_hash, client_type,
                                 redirect_uris, allowed_scopes, grant_types)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(request.tenant_id)
        .bind(&request.name)
        .bind(&client_id)
        .bind(&secret_hash)
        .bind(&request.client_type)
        .bind(&request.redirect_uris)
        .bind(&request.allowed_scopes)
        .bind(&request.grant_types)
        .fetch_one(&self.pool)
        .await?;

        Ok(ClientWithSecret {
            client,
            client_secret: secret,
        })
    }

    pub async fn find_by_client_id(&self, tenant_id: Uuid, client_id: &str) -> Result<Client> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE tenant_id = $1 AND client_id = $2 AND is_active = true",
        )
        .bind(tenant_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Client", client_id))
    }

    /// Regenerate the secret; the old hash is overwritten and the new
    /// plaintext returned once.
    pub async fn regenerate_secret(&self, tenant_id: Uuid, client_id: &str) -> Result<String> {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        let secret_hash = bcrypt::hash(&secret, bcrypt::DEFAULT_COST)
            .map_err(|e| DatabaseError::Other(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE clients SET client_secret_hash = $3, updated_at = NOW()
            WHERE tenant_id = $1 AND client_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(client_id)
        .bind(&secret_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Client", client_id));
        }

        Ok(secret)
    }
}
