use crate::error::{AuthError, Result};
use crate::keys::KeyManager;
use crate::scope;
use aegis_database::{
    AuthCodeRepository, ClientRepository, Database, TokenRepository, UserRepository,
};
use aegis_models::{
    AuthorizationCode, AuthorizeParams, Client, CreateAuthorizationCode, CreateRefreshToken,
    TokenResponse, User,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const ACCESS_TOKEN_TTL_SECONDS: i64 = 3600; // 1 hour
const ID_TOKEN_TTL_SECONDS: i64 = 3600; // 1 hour
const REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 3600; // 30 days

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    pub azp: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// JWT claims for ID tokens (OIDC)
#[derive(Debug, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    /// Single audience: the client the token was issued to
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub azp: String,
    pub tenant_id: String,
    pub email: String,
    pub groups: Vec<String>,
    /// The account's persisted scopes at exchange time
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// Verify a PKCE verifier against the stored challenge. A stored challenge
/// with method `S256` matches `base64url(sha256(verifier))`; `plain` matches
/// the verifier itself; any other method is rejected.
pub fn verify_pkce(
    challenge: Option<&str>,
    method: Option<&str>,
    verifier: Option<&str>,
) -> Result<()> {
    let challenge = match challenge {
        Some(c) => c,
        // No challenge bound at issuance: nothing to verify
        None => return Ok(()),
    };

    let verifier = verifier
        .ok_or_else(|| AuthError::InvalidGrant("code_verifier is required".to_string()))?;

    let matches = match method.unwrap_or("plain") {
        "S256" => compute_s256_challenge(verifier) == challenge,
        "plain" => verifier == challenge,
        other => {
            return Err(AuthError::InvalidGrant(format!(
                "unsupported code_challenge_method: {}",
                other
            )))
        }
    };

    if !matches {
        return Err(AuthError::InvalidGrant("PKCE verification failed".to_string()));
    }

    Ok(())
}

pub fn compute_s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// ID-token claims are built from the account's persisted state at exchange
/// time, never from the scopes the client originally requested. Profile
/// claims only appear when the account holds the `profile` scope.
pub fn build_id_claims(
    user: &User,
    client_id: &str,
    issuer: &str,
    nonce: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> IdTokenClaims {
    let persisted_scope = scope::join(&user.scopes);
    let has_profile = user.scopes.iter().any(|s| s == "profile");

    IdTokenClaims {
        iss: issuer.to_string(),
        sub: user.id.to_string(),
        aud: client_id.to_string(),
        exp: (now + Duration::seconds(ID_TOKEN_TTL_SECONDS)).timestamp(),
        iat: now.timestamp(),
        auth_time: now.timestamp(),
        nonce: nonce.map(String::from),
        azp: client_id.to_string(),
        tenant_id: user.tenant_id.to_string(),
        email: user.email.clone(),
        groups: user.groups.clone(),
        scope: persisted_scope,
        name: if has_profile { user.full_name() } else { None },
        given_name: if has_profile {
            user.first_name.clone()
        } else {
            None
        },
        family_name: if has_profile {
            user.last_name.clone()
        } else {
            None
        },
    }
}

pub struct OAuth2Service {
    issuer: String,
    keys: Arc<KeyManager>,
    clients: ClientRepository,
    users: UserRepository,
    codes: AuthCodeRepository,
    tokens: TokenRepository,
}

impl OAuth2Service {
    pub fn new(db: &Database, keys: Arc<KeyManager>, issuer: String) -> Self {
        let pool = db.pool().clone();

        Self {
            issuer,
            keys,
            clients: ClientRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            codes: AuthCodeRepository::new(pool.clone()),
            tokens: TokenRepository::new(pool),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    // ========================================================================
    // AUTHORIZATION
    // ========================================================================

    /// Validate an inbound /oauth/authorize request against the client
    /// registration. Public clients must carry a PKCE challenge.
    pub async fn validate_authorize_request(
        &self,
        tenant_id: Uuid,
        params: &AuthorizeParams,
    ) -> Result<Client> {
        let client = self
            .clients
            .find_by_client_id(tenant_id, &params.client_id)
            .await
            .map_err(|_| AuthError::InvalidClient)?;

        if !client.allows_redirect_uri(&params.redirect_uri) {
            return Err(AuthError::InvalidRequest("invalid redirect_uri".to_string()));
        }

        if params.response_type != "code" {
            return Err(AuthError::InvalidRequest(
                "only the code response type is supported".to_string(),
            ));
        }

        if client.is_public() && params.code_challenge.is_none() {
            return Err(AuthError::InvalidRequest(
                "PKCE is required for public clients".to_string(),
            ));
        }

        if client.is_public() && params.state.is_none() {
            return Err(AuthError::InvalidRequest(
                "state is required for public clients".to_string(),
            ));
        }

        if let Some(method) = params.code_challenge_method.as_deref() {
            if method != "S256" && method != "plain" {
                return Err(AuthError::InvalidRequest(
                    "invalid code_challenge_method".to_string(),
                ));
            }
        }

        Ok(client)
    }

    /// Persist a validated /oauth/authorize request for the hosted login to
    /// complete.
    pub async fn create_authorization_request(
        &self,
        request: aegis_models::CreateAuthorizationRequest,
    ) -> Result<aegis_models::AuthorizationRequest> {
        Ok(self.codes.create_request(&request).await?)
    }

    pub async fn find_authorization_request(
        &self,
        request_id: &str,
    ) -> Result<aegis_models::AuthorizationRequest> {
        self.codes
            .find_request(request_id)
            .await?
            .ok_or_else(|| {
                AuthError::InvalidGrant("authorization request not found or expired".to_string())
            })
    }

    pub async fn delete_authorization_request(&self, request_id: &str) -> Result<()> {
        Ok(self.codes.delete_request(request_id).await?)
    }

    /// Persist an authorization code for an already-authenticated subject.
    /// This method never authenticates.
    pub async fn create_authorization_code(
        &self,
        request: CreateAuthorizationCode,
    ) -> Result<String> {
        let code = self.codes.create(&request).await?;

        info!(
            client_id = %request.client_id,
            user_id = %request.user_id,
            tenant_id = %request.tenant_id,
            "Created authorization code"
        );

        Ok(code)
    }

    // ========================================================================
    // CODE EXCHANGE
    // ========================================================================

    /// Confidential-client exchange: the client secret is authenticated
    /// before any code lookup.
    pub async fn exchange_code_for_tokens(
        &self,
        tenant_id: Uuid,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let client = self
            .clients
            .find_by_client_id(tenant_id, client_id)
            .await
            .map_err(|_| AuthError::InvalidClient)?;

        let secret_hash = client
            .client_secret_hash
            .as_deref()
            .ok_or(AuthError::InvalidClient)?;

        if !bcrypt::verify(client_secret, secret_hash).unwrap_or(false) {
            warn!(client_id = %client_id, "Client secret verification failed");
            return Err(AuthError::InvalidClient);
        }

        let auth_code = self.consume_code(&client, code, redirect_uri, None).await?;
        self.mint_for_code(&client, &auth_code).await
    }

    /// Public-client exchange: PKCE stands in for the client secret, which
    /// must not be required.
    pub async fn exchange_code_for_tokens_pkce(
        &self,
        tenant_id: Uuid,
        client_id: &str,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        let client = self
            .clients
            .find_by_client_id(tenant_id, client_id)
            .await
            .map_err(|_| AuthError::InvalidClient)?;

        let auth_code = self
            .consume_code(&client, code, redirect_uri, Some(code_verifier))
            .await?;
        self.mint_for_code(&client, &auth_code).await
    }

    /// Consume the code atomically, then bind-check it. The used_at flip and
    /// the not-used/not-expired checks are one conditional update in the
    /// store, so concurrent exchanges admit exactly one winner. A code that
    /// fails a later check stays burned.
    async fn consume_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<AuthorizationCode> {
        let auth_code = match self.codes.consume(code, &client.client_id).await? {
            Ok(auth_code) => auth_code,
            // Cause already logged distinctly at the store; one uniform wire
            // error to avoid probing.
            Err(_) => {
                return Err(AuthError::InvalidGrant(
                    "invalid or expired authorization code".to_string(),
                ));
            }
        };

        if auth_code.redirect_uri != redirect_uri {
            warn!(client_id = %client.client_id, "redirect_uri mismatch on code exchange");
            return Err(AuthError::InvalidGrant("redirect_uri mismatch".to_string()));
        }

        verify_pkce(
            auth_code.code_challenge.as_deref(),
            auth_code.code_challenge_method.as_deref(),
            code_verifier,
        )?;

        Ok(auth_code)
    }

    async fn mint_for_code(
        &self,
        client: &Client,
        auth_code: &AuthorizationCode,
    ) -> Result<TokenResponse> {
        // Re-read the account: issued claims reflect persisted state at
        // exchange time, not at issuance time.
        let user = self
            .users
            .find_by_id(auth_code.tenant_id, auth_code.user_id)
            .await?;

        if !user.is_active {
            return Err(AuthError::AccessDenied("user is inactive".to_string()));
        }

        let tokens = self
            .generate_tokens(&user, client, auth_code.nonce.as_deref(), false)
            .await?;

        info!(
            user_id = %user.id,
            client_id = %client.client_id,
            "Issued tokens via authorization_code grant"
        );

        Ok(tokens)
    }

    // ========================================================================
    // TOKEN GENERATION
    // ========================================================================

    /// Mint the signed token triple for an authenticated subject. The scope
    /// on every token is the account's persisted scope set. A refresh grant
    /// reuses its refresh token and carries no ID token.
    pub async fn generate_tokens(
        &self,
        user: &User,
        client: &Client,
        nonce: Option<&str>,
        for_refresh: bool,
    ) -> Result<TokenResponse> {
        let now = Utc::now();
        let jti = Uuid::new_v4().to_string();
        let granted_scope = scope::join(&user.scopes);
        let access_token_exp = now + Duration::seconds(ACCESS_TOKEN_TTL_SECONDS);

        let access_claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: user.id.to_string(),
            aud: vec![client.client_id.clone()],
            exp: access_token_exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: jti.clone(),
            azp: client.client_id.clone(),
            tenant_id: user.tenant_id.to_string(),
            scope: if granted_scope.is_empty() {
                None
            } else {
                Some(granted_scope.clone())
            },
        };

        let access_token = self.keys.sign(&access_claims)?;

        let id_token = if for_refresh {
            None
        } else {
            let id_claims = build_id_claims(user, &client.client_id, &self.issuer, nonce, now);
            Some(self.keys.sign(&id_claims)?)
        };

        let refresh_token = if for_refresh {
            None
        } else {
            Some(
                self.tokens
                    .create_refresh_token(&CreateRefreshToken {
                        tenant_id: user.tenant_id,
                        client_id: client.client_id.clone(),
                        user_id: user.id,
                        scope: Some(granted_scope.clone()),
                        expires_in_seconds: REFRESH_TOKEN_TTL_SECONDS,
                    })
                    .await?,
            )
        };

        self.tokens
            .record_access_token(
                &jti,
                user.tenant_id,
                &client.client_id,
                Some(user.id),
                Some(&granted_scope),
                access_token_exp,
            )
            .await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_TTL_SECONDS,
            refresh_token,
            id_token,
            scope: Some(granted_scope),
        })
    }

    // ========================================================================
    // REFRESH
    // ========================================================================

    pub async fn refresh_tokens(
        &self,
        tenant_id: Uuid,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let stored = self
            .tokens
            .find_live_refresh_token(refresh_token, client_id)
            .await?
            .ok_or_else(|| {
                AuthError::InvalidGrant("invalid or expired refresh token".to_string())
            })?;

        if stored.tenant_id != tenant_id {
            return Err(AuthError::InvalidGrant(
                "invalid or expired refresh token".to_string(),
            ));
        }

        self.tokens.touch_refresh_token(stored.id).await?;

        let client = self
            .clients
            .find_by_client_id(tenant_id, client_id)
            .await
            .map_err(|_| AuthError::InvalidClient)?;

        let user = self.users.find_by_id(tenant_id, stored.user_id).await?;
        if !user.is_active {
            return Err(AuthError::AccessDenied("user is inactive".to_string()));
        }

        // The existing refresh token stays valid; no ID token on refresh.
        let tokens = self.generate_tokens(&user, &client, None, true).await?;

        info!(client_id = %client_id, "Issued tokens via refresh_token grant");

        Ok(tokens)
    }

    // ========================================================================
    // VALIDATION / REVOCATION
    // ========================================================================

    /// Verify the JWT itself, then cross-check the persisted record: the
    /// token must be present, unexpired, and unrevoked. Signature validity
    /// alone never suffices.
    pub async fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims> {
        let claims: AccessTokenClaims = self
            .keys
            .verify(token)
            .map_err(|e| AuthError::Unauthorized(e.to_string()))?;

        self.tokens
            .find_live_access_token(&claims.jti)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("token revoked or unknown".to_string()))?;

        Ok(claims)
    }

    /// RFC 7009: revocation is idempotent and succeeds silently for unknown
    /// tokens.
    pub async fn revoke_token(&self, client_id: &str, token: &str) -> Result<()> {
        let revoked = self.tokens.revoke_refresh_token(token, client_id).await?;
        if revoked > 0 {
            return Ok(());
        }

        // Not a refresh token; try it as a signed access token.
        if let Ok(claims) = self.keys.verify::<AccessTokenClaims>(token) {
            self.tokens.revoke_access_token(&claims.jti).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(scopes: Vec<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "jane@example.com".to_string(),
            username: None,
            password_hash: None,
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            groups: vec!["staff".to_string()],
            scopes: scopes.into_iter().map(String::from).collect(),
            is_active: true,
            mfa_enabled: false,
            mfa_secret: None,
            mfa_pending_secret: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_pkce_s256_roundtrip() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = compute_s256_challenge(verifier);

        assert!(verify_pkce(Some(&challenge), Some("S256"), Some(verifier)).is_ok());
    }

    #[test]
    fn test_pkce_s256_rejects_wrong_verifier() {
        let challenge = compute_s256_challenge("the real verifier");
        let result = verify_pkce(Some(&challenge), Some("S256"), Some("a different verifier"));
        assert!(matches!(result, Err(AuthError::InvalidGrant(_))));
    }

    #[test]
    fn test_pkce_plain_compares_directly() {
        assert!(verify_pkce(Some("abc123"), Some("plain"), Some("abc123")).is_ok());
        assert!(verify_pkce(Some("abc123"), None, Some("abc123")).is_ok());
        assert!(verify_pkce(Some("abc123"), Some("plain"), Some("xyz")).is_err());
    }

    #[test]
    fn test_pkce_unknown_method_rejected() {
        let result = verify_pkce(Some("abc"), Some("S512"), Some("abc"));
        assert!(matches!(result, Err(AuthError::InvalidGrant(_))));
    }

    #[test]
    fn test_pkce_missing_verifier_rejected() {
        let challenge = compute_s256_challenge("verifier");
        assert!(verify_pkce(Some(&challenge), Some("S256"), None).is_err());
    }

    #[test]
    fn test_pkce_no_challenge_is_a_noop() {
        assert!(verify_pkce(None, None, None).is_ok());
        assert!(verify_pkce(None, None, Some("stray verifier")).is_ok());
    }

    #[test]
    fn test_id_claims_use_persisted_scopes() {
        let user = sample_user(vec!["openid", "email", "reports:read"]);
        let claims = build_id_claims(&user, "dash-web", "https://id.example.com", None, Utc::now());

        // Whatever was originally requested is irrelevant; persisted wins
        assert_eq!(claims.scope, "openid email reports:read");
        assert_eq!(claims.aud, "dash-web");
        assert_eq!(claims.email, "jane@example.com");
        assert_eq!(claims.groups, vec!["staff".to_string()]);
        assert_eq!(claims.tenant_id, user.tenant_id.to_string());
    }

    #[test]
    fn test_id_claims_profile_gating() {
        let without_profile = sample_user(vec!["openid"]);
        let claims = build_id_claims(
            &without_profile,
            "dash-web",
            "https://id.example.com",
            None,
            Utc::now(),
        );
        assert!(claims.name.is_none());
        assert!(claims.given_name.is_none());

        let with_profile = sample_user(vec!["openid", "profile"]);
        let claims = build_id_claims(
            &with_profile,
            "dash-web",
            "https://id.example.com",
            None,
            Utc::now(),
        );
        assert_eq!(claims.name.as_deref(), Some("Jane Doe"));
        assert_eq!(claims.given_name.as_deref(), Some("Jane"));
    }

    #[test]
    fn test_id_claims_carry_nonce() {
        let user = sample_user(vec!["openid"]);
        let claims = build_id_claims(
            &user,
            "dash-web",
            "https://id.example.com",
            Some("n-0S6_WzA2Mj"),
            Utc::now(),
        );
        assert_eq!(claims.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
    }

    #[test]
    fn test_id_token_expiry_window() {
        let user = sample_user(vec!["openid"]);
        let now = Utc::now();
        let claims = build_id_claims(&user, "dash-web", "https://id.example.com", None, now);
        assert_eq!(claims.exp - claims.iat, ID_TOKEN_TTL_SECONDS);
    }
}
