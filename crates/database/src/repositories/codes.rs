use crate::error::Result;
use aegis_models::{
    AuthorizationCode, AuthorizationRequest, CreateAuthorizationCode, CreateAuthorizationRequest,
};
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::PgPool;
use tracing::warn;

const CODE_TTL_MINUTES: i64 = 10;
const REQUEST_TTL_MINUTES: i64 = 10;

/// Why a consume attempt found nothing to consume. Logged distinctly; the
/// wire error is a uniform invalid_grant.
#[derive(Debug, PartialEq, Eq)]
pub enum CodeConsumeFailure {
    Unknown,
    AlreadyUsed,
    Expired,
}

#[derive(Clone)]
pub struct AuthCodeRepository {
    pool: PgPool,
}

impl AuthCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &CreateAuthorizationCode) -> Result<String> {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        let expires_at = Utc::now() + Duration::minutes(CODE_TTL_MINUTES);

        sqlx::query(
            r#"
            INSERT INTO authorization_codes (
                code, tenant_id, client_id, user_id, redirect_uri, scope,
                code_challenge, code_challenge_method, nonce, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&code)
        .bind(request.tenant_id)
        .bind(&request.client_id)
        .bind(request.user_id)
        .bind(&request.redirect_uri)
        .bind(&request.scope)
        .bind(&request.code_challenge)
        .bind(&request.code_challenge_method)
        .bind(&request.nonce)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(code)
    }

    /// Atomically consume a code: the used_at transition and the eligibility
    /// check are one conditional UPDATE, so two concurrent exchanges of the
    /// same code admit exactly one winner.
    pub async fn consume(
        &self,
        code: &str,
        client_id: &str,
    ) -> Result<std::result::Result<AuthorizationCode, CodeConsumeFailure>> {
        let consumed = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            UPDATE authorization_codes
            SET used_at = NOW()
            WHERE code = $1 AND client_id = $2 AND used_at IS NULL AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(auth_code) = consumed {
            return Ok(Ok(auth_code));
        }

        // Lost the race or never eligible; classify for the log only.
        let existing = sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes WHERE code = $1 AND client_id = $2",
        )
        .bind(code)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        let failure = match existing {
            None => CodeConsumeFailure::Unknown,
            Some(c) if c.used_at.is_some() => CodeConsumeFailure::AlreadyUsed,
            Some(_) => CodeConsumeFailure::Expired,
        };

        warn!(client_id = %client_id, reason = ?failure, "Authorization code consume failed");

        Ok(Err(failure))
    }

    // ------------------------------------------------------------------
    // Pending authorization requests
    // ------------------------------------------------------------------

    pub async fn create_request(
        &self,
        request: &CreateAuthorizationRequest,
    ) -> Result<AuthorizationRequest> {
        let request_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let expires_at = Utc::now() + Duration::minutes(REQUEST_TTL_MINUTES);

        let auth_request = sqlx::query_as::<_, AuthorizationRequest>(
            r#"
            INSERT INTO authorization_requests (
                request_id, tenant_id, client_id, redirect_uri, response_type,
                scope, state, code_challenge, code_challenge_method, nonce, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&request_id)
        .bind(request.tenant_id)
        .bind(&request.client_id)
        .bind(&request.redirect_uri)
        .bind(&request.response_type)
        .bind(&request.scope)
        .bind(&request.state)
        .bind(&request.code_challenge)
        .bind(&request.code_challenge_method)
        .bind(&request.nonce)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(auth_request)
    }

    pub async fn find_request(&self, request_id: &str) -> Result<Option<AuthorizationRequest>> {
        let request = sqlx::query_as::<_, AuthorizationRequest>(
            "SELECT * FROM authorization_requests WHERE request_id = $1 AND expires_at > NOW()",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    pub async fn delete_request(&self, request_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM authorization_requests WHERE request_id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
