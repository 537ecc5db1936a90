use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// AUTHORIZATION CODE
// ============================================================================

/// Single-use credential minted at /oauth/authorize and consumed exactly once
/// at /oauth/token. `used_at` transitions NULL -> timestamp once; the store
/// enforces this with a conditional update.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorizationCode {
    pub code: String,
    pub tenant_id: Uuid,
    pub client_id: String,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAuthorizationCode {
    pub tenant_id: Uuid,
    pub client_id: String,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
}

// ============================================================================
// PENDING AUTHORIZATION REQUEST
// ============================================================================

/// A validated /oauth/authorize request waiting for the subject to
/// authenticate. Held server-side so the login step never trusts
/// client-supplied OAuth parameters.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorizationRequest {
    pub id: Uuid,
    pub request_id: String,
    pub tenant_id: Uuid,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAuthorizationRequest {
    pub tenant_id: Uuid,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
}

// ============================================================================
// REFRESH TOKEN
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token_hash: String,
    pub tenant_id: Uuid,
    pub client_id: String,
    pub user_id: Uuid,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRefreshToken {
    pub tenant_id: Uuid,
    pub client_id: String,
    pub user_id: Uuid,
    pub scope: Option<String>,
    pub expires_in_seconds: i64,
}

// ============================================================================
// ACCESS TOKEN RECORD
// ============================================================================

/// Persisted mirror of an issued access token, keyed by JTI. A token is only
/// valid while this row exists, is unexpired, and unrevoked; signature
/// validity alone never suffices.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessTokenRecord {
    pub id: Uuid,
    pub jti: String,
    pub tenant_id: Uuid,
    pub client_id: String,
    pub user_id: Option<Uuid>,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SIGNING KEY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SigningKey {
    /// Derived deterministically from the public key material
    pub kid: String,

    /// "RS256" or "HS256"
    pub algorithm: String,

    /// PEM for RSA keys, empty for symmetric keys
    pub public_key_pem: String,

    #[serde(skip_serializing)]
    pub private_key_pem: String,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// OIDC DISCOVERY
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OidcDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub revocation_endpoint: String,
}

impl OidcDiscovery {
    /// Discovery document for the deployment-wide issuer.
    pub fn new(issuer: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{}/oauth/authorize", issuer),
            token_endpoint: format!("{}/oauth/token", issuer),
            jwks_uri: format!("{}/.well-known/jwks.json", issuer),
            scopes_supported: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
            ],
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
                "password".to_string(),
            ],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
                "none".to_string(),
            ],
            claims_supported: vec![
                "sub".to_string(),
                "iss".to_string(),
                "aud".to_string(),
                "exp".to_string(),
                "iat".to_string(),
                "nonce".to_string(),
                "email".to_string(),
                "name".to_string(),
                "given_name".to_string(),
                "family_name".to_string(),
                "groups".to_string(),
                "scope".to_string(),
                "tenant_id".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
            revocation_endpoint: format!("{}/oauth/revoke", issuer),
        }
    }

    /// Tenant-specific discovery: issuer and endpoints rooted under the
    /// tenant's path prefix.
    pub fn for_tenant(base: &str, tenant_id: Uuid) -> Self {
        Self::new(&format!("{}/tenant/{}", base, tenant_id))
    }
}

// ============================================================================
// JWKS (JSON Web Key Set)
// ============================================================================

#[derive(Debug, Serialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Serialize)]
pub struct Jwk {
    pub kty: String,
    pub r#use: String,
    pub kid: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

// ============================================================================
// TOKEN REQUEST / RESPONSE
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp_code: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// RFC 6749 error body
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    pub fn new(error: &str, description: &str) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description.to_string()),
        }
    }

    pub fn invalid_request(description: &str) -> Self {
        Self::new("invalid_request", description)
    }

    pub fn invalid_client(description: &str) -> Self {
        Self::new("invalid_client", description)
    }

    pub fn invalid_grant(description: &str) -> Self {
        Self::new("invalid_grant", description)
    }

    pub fn access_denied(description: &str) -> Self {
        Self::new("access_denied", description)
    }

    pub fn unsupported_grant_type(description: &str) -> Self {
        Self::new("unsupported_grant_type", description)
    }

    pub fn server_error(description: &str) -> Self {
        Self::new("server_error", description)
    }
}

// ============================================================================
// AUTHORIZE PARAMETERS (query/form)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    // Present when credentials are POSTed straight to /oauth/authorize
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub totp_code: Option<String>,
    /// Completion of a stored authorization request from the hosted login;
    /// when present the server-side record wins over the posted parameters.
    #[serde(default)]
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_endpoints_rooted_under_issuer() {
        let discovery = OidcDiscovery::new("https://id.example.com");
        assert_eq!(discovery.issuer, "https://id.example.com");
        assert_eq!(
            discovery.token_endpoint,
            "https://id.example.com/oauth/token"
        );
        assert_eq!(
            discovery.jwks_uri,
            "https://id.example.com/.well-known/jwks.json"
        );
    }

    #[test]
    fn test_tenant_discovery_rooted_under_tenant_path() {
        let tenant_id = Uuid::new_v4();
        let discovery = OidcDiscovery::for_tenant("https://id.example.com", tenant_id);
        let expected = format!("https://id.example.com/tenant/{}", tenant_id);
        assert_eq!(discovery.issuer, expected);
        assert!(discovery
            .authorization_endpoint
            .starts_with(&expected));
    }

    #[test]
    fn test_token_error_shape() {
        let err = TokenError::invalid_grant("code already used");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"error\":\"invalid_grant\""));
        assert!(json.contains("code already used"));
    }

    #[test]
    fn test_token_response_omits_empty_fields() {
        let resp = TokenResponse {
            access_token: "at".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            refresh_token: None,
            id_token: None,
            scope: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(!json.contains("id_token"));
    }
}
