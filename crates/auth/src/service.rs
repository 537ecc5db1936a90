use crate::error::{AuthError, Result};
use crate::oauth2_service::OAuth2Service;
use crate::password::PasswordHasher;
use crate::twofactor::TwoFactorService;
use aegis_database::{Database, TwoFactorRepository, UserRepository};
use aegis_models::{Client, ClientType, NewUser, TokenResponse, User, UserProfile};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Client identity used for direct (non-redirect) logins, so they produce
/// the same standards-shaped token triple as the redirect flow.
pub const INTERNAL_LOGIN_CLIENT_ID: &str = "aegis-login";

const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile"];

const TWO_FACTOR_SESSION_TTL_SECONDS: i64 = 300;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    pub password: String,

    /// Re-submission after a two_factor_required outcome
    pub totp_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8))]
    pub password: String,

    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
pub enum LoginOutcome {
    #[serde(rename = "success")]
    Success {
        #[serde(flatten)]
        tokens: TokenResponse,
        user: UserProfile,
    },

    /// Not a failure: the caller must re-submit the code against the
    /// returned session.
    #[serde(rename = "two_factor_required")]
    TwoFactorRequired {
        two_factor_required: bool,
        session_token: String,
        expires_in: i64,
        message: String,
    },
}

/// Outcome of credential verification alone, before any token issuance.
pub enum CredentialCheck {
    Verified(Box<User>),
    TwoFactorRequired { session_token: String },
}

pub struct AuthService {
    users: UserRepository,
    sessions: TwoFactorRepository,
    twofactor: Arc<TwoFactorService>,
    oauth2: Arc<OAuth2Service>,
}

impl AuthService {
    pub fn new(
        db: &Database,
        twofactor: Arc<TwoFactorService>,
        oauth2: Arc<OAuth2Service>,
    ) -> Self {
        let pool = db.pool().clone();

        Self {
            users: UserRepository::new(pool.clone()),
            sessions: TwoFactorRepository::new(pool),
            twofactor,
            oauth2,
        }
    }

    /// Direct credential login. Unknown user, bad password, inactive user,
    /// and bad second factor all surface as one generic failure; each cause
    /// is logged distinctly.
    pub async fn authenticate(
        &self,
        tenant: &aegis_models::Tenant,
        request: LoginRequest,
    ) -> Result<LoginOutcome> {
        match self.verify_credentials(tenant, &request).await? {
            CredentialCheck::Verified(user) => self.issue_for(*user).await,
            CredentialCheck::TwoFactorRequired { session_token } => {
                Ok(LoginOutcome::TwoFactorRequired {
                    two_factor_required: true,
                    session_token,
                    expires_in: TWO_FACTOR_SESSION_TTL_SECONDS,
                    message: "Verify your identity with a second factor.".to_string(),
                })
            }
        }
    }

    /// Credential verification without token issuance, for callers that
    /// continue into the Authorization-Code flow instead.
    pub async fn verify_credentials(
        &self,
        tenant: &aegis_models::Tenant,
        request: &LoginRequest,
    ) -> Result<CredentialCheck> {
        request.validate()?;

        let user = match self.users.find_by_email_opt(tenant.id, &request.email).await? {
            Some(user) => user,
            None => {
                warn!(tenant_id = %tenant.id, "Login failed: unknown user");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !user.is_active {
            warn!(user_id = %user.id, "Login failed: user inactive");
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = match user.password_hash.as_deref() {
            Some(hash) => hash,
            None => {
                warn!(user_id = %user.id, "Login failed: social-only account has no password");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !PasswordHasher::verify(&request.password, password_hash)? {
            warn!(user_id = %user.id, "Login failed: bad password");
            return Err(AuthError::InvalidCredentials);
        }

        if tenant.settings.mfa_required && !user.mfa_enabled {
            warn!(user_id = %user.id, "Tenant requires two-factor but user is not enrolled");
        }

        if user.mfa_enabled {
            match request.totp_code.as_deref() {
                Some(code) => {
                    if !self.twofactor.verify(&user, code).await? {
                        warn!(user_id = %user.id, "Login failed: bad second-factor code");
                        return Err(AuthError::InvalidCredentials);
                    }
                }
                None => {
                    let session_token = self
                        .sessions
                        .create_session(tenant.id, user.id, Some(INTERNAL_LOGIN_CLIENT_ID))
                        .await?;

                    return Ok(CredentialCheck::TwoFactorRequired { session_token });
                }
            }
        }

        Ok(CredentialCheck::Verified(Box::new(user)))
    }

    /// Resolve a pending two-factor session, validate the code, and finish
    /// the login it was gating. Expired sessions fail closed.
    pub async fn complete_two_factor(
        &self,
        tenant: &aegis_models::Tenant,
        session_token: &str,
        code: &str,
    ) -> Result<LoginOutcome> {
        let session = self
            .sessions
            .find_pending_session(session_token)
            .await?
            .ok_or_else(|| {
                warn!("Two-factor session unknown or expired");
                AuthError::Unauthorized("invalid or expired verification session".to_string())
            })?;

        if session.tenant_id != tenant.id {
            return Err(AuthError::Unauthorized(
                "invalid or expired verification session".to_string(),
            ));
        }

        let user = self.users.find_by_id(session.tenant_id, session.user_id).await?;

        if !self.twofactor.verify(&user, code).await? {
            warn!(user_id = %user.id, "Two-factor session verification failed");
            return Err(AuthError::Unauthorized("invalid code".to_string()));
        }

        self.sessions.mark_session_verified(session.id).await?;

        self.issue_for(user).await
    }

    /// Self-service registration, gated by the tenant's settings.
    pub async fn register(
        &self,
        tenant: &aegis_models::Tenant,
        request: RegisterRequest,
    ) -> Result<LoginOutcome> {
        request.validate()?;

        if !tenant.settings.allow_registration {
            return Err(AuthError::AccessDenied(
                "registration is disabled for this tenant".to_string(),
            ));
        }

        let password_hash = PasswordHasher::hash(&request.password)?;

        let new_user = NewUser {
            tenant_id: tenant.id,
            email: request.email,
            username: request.username,
            password: None,
            first_name: request.first_name,
            last_name: request.last_name,
            groups: vec![],
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        let user = self.users.create(&new_user, Some(&password_hash)).await?;

        info!(user_id = %user.id, tenant_id = %tenant.id, "Registered user");

        self.issue_for(user).await
    }

    async fn issue_for(&self, user: User) -> Result<LoginOutcome> {
        self.users.update_last_login(user.id).await?;

        let client = internal_login_client(user.tenant_id);
        let tokens = self.oauth2.generate_tokens(&user, &client, None, false).await?;

        Ok(LoginOutcome::Success {
            tokens,
            user: user.into(),
        })
    }
}

/// The internal client identity never lives in the client store; it exists
/// only to stamp direct-login tokens with a stable audience.
pub(crate) fn internal_login_client(tenant_id: Uuid) -> Client {
    Client {
        id: Uuid::nil(),
        tenant_id,
        name: "Direct login".to_string(),
        client_id: INTERNAL_LOGIN_CLIENT_ID.to_string(),
        client_secret_hash: None,
        client_type: ClientType::Public,
        redirect_uris: vec![],
        allowed_scopes: vec![],
        grant_types: vec!["password".to_string()],
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_client_shape() {
        let tenant_id = Uuid::new_v4();
        let client = internal_login_client(tenant_id);
        assert_eq!(client.client_id, INTERNAL_LOGIN_CLIENT_ID);
        assert_eq!(client.tenant_id, tenant_id);
        assert!(client.is_public());
        assert!(client.allows_grant_type("password"));
        assert!(!client.allows_grant_type("authorization_code"));
    }

    #[test]
    fn test_two_factor_outcome_wire_shape() {
        let outcome = LoginOutcome::TwoFactorRequired {
            two_factor_required: true,
            session_token: "opaque".to_string(),
            expires_in: 300,
            message: "Verify your identity with a second factor.".to_string(),
        };

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"two_factor_required\""));
        assert!(json.contains("\"two_factor_required\":true"));
        // No tokens leak on the intermediate outcome
        assert!(!json.contains("access_token"));
    }
}
