use crate::error::{AuthError, Result};
use crate::oauth2_service::OAuth2Service;
use crate::service::internal_login_client;
use aegis_cache::{relay_state_key, Cache};
use aegis_database::{Database, SocialProviderRepository, UserRepository};
use aegis_models::{
    CreateAuthorizationCode, NewUser, NormalizedIdentity, ProviderKind, SocialProvider,
    SocialRelayState, RelayedOAuthParams, TokenResponse, Tenant, User, UserProfile,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Relay state lives for one browser round trip to the provider.
const RELAY_TTL_SECONDS: u64 = 600;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile"];

/// Token response from an external provider
#[derive(Debug, Deserialize)]
struct ProviderTokens {
    access_token: String,
}

/// Where a completed callback goes next.
pub enum SocialLoginOutcome {
    /// Plain social login: a direct token triple, same shape as /login
    Tokens {
        tokens: TokenResponse,
        user: UserProfile,
    },
    /// OAuth continuation: redirect the browser back to the original client
    /// with a freshly minted authorization code
    AuthorizationRedirect { redirect_url: String },
}

/// Drives the external-provider OAuth2 dance and hands off into the local
/// Authorization-Code flow.
pub struct SocialBroker {
    providers: SocialProviderRepository,
    users: UserRepository,
    oauth2: Arc<OAuth2Service>,
    cache: Cache,
    http: reqwest::Client,
}

impl SocialBroker {
    pub fn new(db: &Database, cache: Cache, oauth2: Arc<OAuth2Service>) -> Result<Self> {
        let pool = db.pool().clone();

        // Outbound calls carry their own timeouts so a slow IdP cannot hold
        // a request open indefinitely.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            providers: SocialProviderRepository::new(pool.clone()),
            users: UserRepository::new(pool),
            oauth2,
            cache,
            http,
        })
    }

    // ========================================================================
    // AUTHORIZE REDIRECT
    // ========================================================================

    /// Build the provider authorize URL and persist the relay state under a
    /// random nonce. Fails for disabled or credential-less providers.
    pub async fn begin_login(
        &self,
        tenant: &Tenant,
        provider_name: &str,
        oauth: Option<RelayedOAuthParams>,
    ) -> Result<String> {
        let provider = self
            .providers
            .find_enabled(tenant.id, provider_name)
            .await
            .map_err(|_| {
                AuthError::AccessDenied(format!("provider {} is not available", provider_name))
            })?;

        if provider.client_id.is_empty() || provider.client_secret.is_empty() {
            return Err(AuthError::AccessDenied(format!(
                "provider {} is not configured",
                provider_name
            )));
        }

        let nonce = Uuid::new_v4().to_string();
        let relay = SocialRelayState {
            provider_id: provider.id,
            tenant_id: tenant.id,
            nonce: nonce.clone(),
            oauth,
            created_at: Utc::now(),
        };

        self.cache
            .set(&relay_state_key(&nonce), &relay, Some(RELAY_TTL_SECONDS))
            .await?;

        let url = build_authorize_url(&provider, &nonce);

        info!(
            provider = %provider.name,
            tenant_id = %tenant.id,
            "Initiating social login"
        );

        Ok(url)
    }

    // ========================================================================
    // CALLBACK
    // ========================================================================

    /// Process the provider callback: validate state (single use), exchange
    /// the code, normalize the profile, link or create the user, and either
    /// issue tokens or continue the relayed Authorization-Code flow.
    pub async fn handle_callback(
        &self,
        tenant: &Tenant,
        provider_name: &str,
        code: &str,
        state: &str,
    ) -> Result<SocialLoginOutcome> {
        // Single-use read: a replayed state finds nothing.
        let relay: SocialRelayState = self
            .cache
            .take(&relay_state_key(state))
            .await?
            .ok_or_else(|| {
                warn!(provider = %provider_name, "Social callback with unknown or expired state");
                AuthError::InvalidGrant("state mismatch or expired".to_string())
            })?;

        if relay.tenant_id != tenant.id {
            warn!(provider = %provider_name, "Social callback tenant mismatch");
            return Err(AuthError::InvalidGrant("state mismatch or expired".to_string()));
        }

        // Re-check the provider row; a provider disabled mid-flight must not
        // accept the callback.
        let provider = self
            .providers
            .find_enabled(tenant.id, provider_name)
            .await
            .map_err(|_| {
                AuthError::AccessDenied(format!("provider {} is not available", provider_name))
            })?;

        if provider.id != relay.provider_id {
            return Err(AuthError::InvalidGrant("state mismatch or expired".to_string()));
        }

        let identity = self.exchange_and_normalize(&provider, code).await?;
        let user = self.link_or_create_user(tenant, &provider, &identity).await?;

        match relay.oauth {
            Some(oauth) => self.continue_authorization(tenant, user, oauth).await,
            None => {
                let client = internal_login_client(tenant.id);
                let tokens = self.oauth2.generate_tokens(&user, &client, None, false).await?;

                Ok(SocialLoginOutcome::Tokens {
                    tokens,
                    user: user.into(),
                })
            }
        }
    }

    /// Social login as a front-end to the local code-issuance step: mint an
    /// authorization code bound to the resolved user and the relayed OAuth
    /// parameters, then send the browser back to the original client.
    async fn continue_authorization(
        &self,
        tenant: &Tenant,
        user: User,
        oauth: RelayedOAuthParams,
    ) -> Result<SocialLoginOutcome> {
        let code = self
            .oauth2
            .create_authorization_code(CreateAuthorizationCode {
                tenant_id: tenant.id,
                client_id: oauth.client_id.clone(),
                user_id: user.id,
                redirect_uri: oauth.redirect_uri.clone(),
                scope: oauth.scope.clone(),
                code_challenge: oauth.code_challenge.clone(),
                code_challenge_method: oauth.code_challenge_method.clone(),
                nonce: oauth.nonce.clone(),
            })
            .await?;

        let redirect_url = format!(
            "{}?code={}&state={}",
            oauth.redirect_uri,
            urlencoding::encode(&code),
            urlencoding::encode(oauth.state.as_deref().unwrap_or(""))
        );

        Ok(SocialLoginOutcome::AuthorizationRedirect { redirect_url })
    }

    // ========================================================================
    // PROVIDER CALLS
    // ========================================================================

    /// Exchange the provider code for an access token and map the profile
    /// payload onto the normalized shape.
    pub async fn exchange_and_normalize(
        &self,
        provider: &SocialProvider,
        code: &str,
    ) -> Result<NormalizedIdentity> {
        let kind = ProviderKind::from_name(&provider.name);
        let tokens = self.exchange_token(provider, kind, code).await?;

        let userinfo_url = effective_url(&provider.userinfo_url, kind.userinfo_url());
        if userinfo_url.is_empty() {
            return Err(AuthError::Provider(
                "provider has no userinfo endpoint".to_string(),
            ));
        }

        let response = self
            .http
            .get(&userinfo_url)
            .header("Authorization", format!("Bearer {}", tokens.access_token))
            .header("Accept", "application/json")
            .header("User-Agent", "Aegis")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!(provider = %provider.name, status = %status, "Userinfo fetch failed");
            return Err(AuthError::Provider(format!(
                "userinfo fetch failed: {}",
                status
            )));
        }

        let raw: serde_json::Value = response.json().await?;

        let mut identity = match kind {
            ProviderKind::Google => normalize_google(&raw),
            ProviderKind::Github => normalize_github(&raw),
            ProviderKind::Microsoft => normalize_microsoft(&raw),
            ProviderKind::Facebook => normalize_facebook(&raw),
            ProviderKind::Generic => normalize_generic(&provider.name, &raw),
        };

        // GitHub hides private e-mail addresses behind a secondary endpoint.
        if identity.email.is_none() && kind == ProviderKind::Github {
            identity.email = self.fetch_github_primary_email(&tokens.access_token).await.ok();
        }

        info!(
            provider = %provider.name,
            external_id = %identity.external_id,
            "Social identity normalized"
        );

        Ok(identity)
    }

    async fn exchange_token(
        &self,
        provider: &SocialProvider,
        kind: ProviderKind,
        code: &str,
    ) -> Result<ProviderTokens> {
        let token_url = effective_url(&provider.token_url, kind.token_url());
        if token_url.is_empty() {
            return Err(AuthError::Provider(
                "provider has no token endpoint".to_string(),
            ));
        }

        let response = match kind {
            // GitHub wants the JSON Accept header and no grant_type
            ProviderKind::Github => {
                self.http
                    .post(&token_url)
                    .header("Accept", "application/json")
                    .form(&[
                        ("client_id", provider.client_id.as_str()),
                        ("client_secret", provider.client_secret.as_str()),
                        ("code", code),
                        ("redirect_uri", provider.redirect_url.as_str()),
                    ])
                    .send()
                    .await?
            }
            _ => {
                self.http
                    .post(&token_url)
                    .form(&[
                        ("grant_type", "authorization_code"),
                        ("client_id", provider.client_id.as_str()),
                        ("client_secret", provider.client_secret.as_str()),
                        ("code", code),
                        ("redirect_uri", provider.redirect_url.as_str()),
                    ])
                    .send()
                    .await?
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = %provider.name, status = %status, body = %body, "Token exchange failed");
            return Err(AuthError::Provider(format!(
                "token exchange failed: {}",
                status
            )));
        }

        Ok(response.json::<ProviderTokens>().await?)
    }

    async fn fetch_github_primary_email(&self, access_token: &str) -> Result<String> {
        let response = self
            .http
            .get("https://api.github.com/user/emails")
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .header("User-Agent", "Aegis")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Provider("email fetch failed".to_string()));
        }

        let emails: Vec<serde_json::Value> = response.json().await?;

        for email_obj in &emails {
            if email_obj["primary"].as_bool() == Some(true) {
                if let Some(email) = email_obj["email"].as_str() {
                    return Ok(email.to_string());
                }
            }
        }

        for email_obj in &emails {
            if email_obj["verified"].as_bool() == Some(true) {
                if let Some(email) = email_obj["email"].as_str() {
                    return Ok(email.to_string());
                }
            }
        }

        Err(AuthError::Provider("no usable email".to_string()))
    }

    // ========================================================================
    // ACCOUNT LINKING
    // ========================================================================

    /// Link by e-mail within the tenant, or provision a passwordless account
    /// with default scopes and a provider-derived group.
    pub async fn link_or_create_user(
        &self,
        tenant: &Tenant,
        provider: &SocialProvider,
        identity: &NormalizedIdentity,
    ) -> Result<User> {
        let email = identity
            .email
            .as_deref()
            .ok_or_else(|| AuthError::Provider("email is required for social login".to_string()))?;

        let group = format!("social:{}", provider.name);

        if let Some(user) = self.users.find_by_email_opt(tenant.id, email).await? {
            self.users.add_group(user.id, &group).await?;
            return self.users.find_by_id(tenant.id, user.id).await.map_err(Into::into);
        }

        if !tenant.settings.allow_registration {
            return Err(AuthError::AccessDenied(
                "registration is disabled for this tenant".to_string(),
            ));
        }

        let new_user = NewUser {
            tenant_id: tenant.id,
            email: email.to_string(),
            username: None,
            password: None,
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            groups: vec![group],
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        let user = self.users.create(&new_user, None).await?;

        info!(
            user_id = %user.id,
            provider = %provider.name,
            "Created user via social login"
        );

        Ok(user)
    }
}

// ============================================================================
// URL CONSTRUCTION / NORMALIZATION
// ============================================================================

fn effective_url(configured: &str, default: &str) -> String {
    if configured.is_empty() {
        default.to_string()
    } else {
        configured.to_string()
    }
}

/// Assemble the provider authorize URL. Provider quirks stay here: GitHub
/// omits response_type, Google asks for offline access.
pub fn build_authorize_url(provider: &SocialProvider, state: &str) -> String {
    let kind = ProviderKind::from_name(&provider.name);
    let base = effective_url(&provider.authorize_url, kind.authorization_url());

    let scopes = if provider.scopes.is_empty() {
        kind.default_scopes()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
    } else {
        provider.scopes.clone()
    };
    let scope_str = scopes.join(" ");

    let mut url = match kind {
        ProviderKind::Github => format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
            base,
            urlencoding::encode(&provider.client_id),
            urlencoding::encode(&provider.redirect_url),
            urlencoding::encode(&scope_str),
            urlencoding::encode(state),
        ),
        _ => format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            base,
            urlencoding::encode(&provider.client_id),
            urlencoding::encode(&provider.redirect_url),
            urlencoding::encode(&scope_str),
            urlencoding::encode(state),
        ),
    };

    for (key, value) in kind.extra_authorize_params() {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(value);
    }

    url
}

fn normalize_google(raw: &serde_json::Value) -> NormalizedIdentity {
    NormalizedIdentity {
        provider: "google".to_string(),
        external_id: raw["sub"].as_str().unwrap_or("").to_string(),
        email: raw["email"].as_str().map(String::from),
        first_name: raw["given_name"].as_str().map(String::from),
        last_name: raw["family_name"].as_str().map(String::from),
    }
}

fn normalize_github(raw: &serde_json::Value) -> NormalizedIdentity {
    let name = raw["name"].as_str();
    let (first_name, last_name) = match name {
        Some(full_name) => {
            let mut parts = full_name.splitn(2, ' ');
            (
                parts.next().map(String::from),
                parts.next().map(String::from),
            )
        }
        None => (None, None),
    };

    NormalizedIdentity {
        provider: "github".to_string(),
        external_id: raw["id"].as_i64().map(|i| i.to_string()).unwrap_or_default(),
        email: raw["email"].as_str().map(String::from),
        first_name,
        last_name,
    }
}

fn normalize_microsoft(raw: &serde_json::Value) -> NormalizedIdentity {
    NormalizedIdentity {
        provider: "microsoft".to_string(),
        external_id: raw["id"].as_str().unwrap_or("").to_string(),
        email: raw["mail"]
            .as_str()
            .or(raw["userPrincipalName"].as_str())
            .map(String::from),
        first_name: raw["givenName"].as_str().map(String::from),
        last_name: raw["surname"].as_str().map(String::from),
    }
}

fn normalize_facebook(raw: &serde_json::Value) -> NormalizedIdentity {
    NormalizedIdentity {
        provider: "facebook".to_string(),
        external_id: raw["id"].as_str().unwrap_or("").to_string(),
        email: raw["email"].as_str().map(String::from),
        first_name: raw["first_name"].as_str().map(String::from),
        last_name: raw["last_name"].as_str().map(String::from),
    }
}

fn normalize_generic(provider: &str, raw: &serde_json::Value) -> NormalizedIdentity {
    NormalizedIdentity {
        provider: provider.to_string(),
        external_id: raw["sub"]
            .as_str()
            .or(raw["id"].as_str())
            .unwrap_or("")
            .to_string(),
        email: raw["email"].as_str().map(String::from),
        first_name: raw["given_name"]
            .as_str()
            .or(raw["first_name"].as_str())
            .map(String::from),
        last_name: raw["family_name"]
            .as_str()
            .or(raw["last_name"].as_str())
            .map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(name: &str) -> SocialProvider {
        SocialProvider {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: name.to_string(),
            display_name: name.to_string(),
            client_id: "provider-client".to_string(),
            client_secret: "provider-secret".to_string(),
            redirect_url: "https://id.example.com/auth/callback".to_string(),
            is_enabled: true,
            scopes: vec![],
            authorize_url: String::new(),
            token_url: String::new(),
            userinfo_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_google_authorize_url_asks_for_offline_access() {
        let url = build_authorize_url(&provider("google"), "nonce-1");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=nonce-1"));
    }

    #[test]
    fn test_github_authorize_url_has_no_response_type() {
        let url = build_authorize_url(&provider("github"), "nonce-2");
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(!url.contains("response_type"));
        assert!(url.contains("state=nonce-2"));
    }

    #[test]
    fn test_configured_endpoint_overrides_kind_default() {
        let mut p = provider("generic");
        p.authorize_url = "https://sso.partner.example/authorize".to_string();
        let url = build_authorize_url(&p, "n");
        assert!(url.starts_with("https://sso.partner.example/authorize?"));
    }

    #[test]
    fn test_configured_scopes_override_defaults() {
        let mut p = provider("google");
        p.scopes = vec!["openid".to_string(), "calendar".to_string()];
        let url = build_authorize_url(&p, "n");
        assert!(url.contains("scope=openid%20calendar"));
    }

    #[test]
    fn test_normalize_google() {
        let raw = json!({
            "sub": "10954213",
            "email": "jane@example.com",
            "given_name": "Jane",
            "family_name": "Doe"
        });
        let identity = normalize_google(&raw);
        assert_eq!(identity.external_id, "10954213");
        assert_eq!(identity.email.as_deref(), Some("jane@example.com"));
        assert_eq!(identity.first_name.as_deref(), Some("Jane"));
    }

    #[test]
    fn test_normalize_github_splits_name() {
        let raw = json!({
            "id": 583231,
            "name": "Jane van Doe",
            "email": null
        });
        let identity = normalize_github(&raw);
        assert_eq!(identity.external_id, "583231");
        assert_eq!(identity.first_name.as_deref(), Some("Jane"));
        assert_eq!(identity.last_name.as_deref(), Some("van Doe"));
        assert!(identity.email.is_none());
    }

    #[test]
    fn test_normalize_microsoft_falls_back_to_upn() {
        let raw = json!({
            "id": "abc-123",
            "userPrincipalName": "jane@contoso.com",
            "givenName": "Jane",
            "surname": "Doe"
        });
        let identity = normalize_microsoft(&raw);
        assert_eq!(identity.email.as_deref(), Some("jane@contoso.com"));
    }

    #[test]
    fn test_normalize_generic_tries_both_field_styles() {
        let raw = json!({
            "sub": "u-1",
            "email": "x@example.com",
            "first_name": "X"
        });
        let identity = normalize_generic("okta", &raw);
        assert_eq!(identity.provider, "okta");
        assert_eq!(identity.external_id, "u-1");
        assert_eq!(identity.first_name.as_deref(), Some("X"));
    }
}
