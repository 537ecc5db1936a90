use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant-scoped external identity provider configuration. Disabled rows are
/// never offered on the login surface and their callbacks are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SocialProvider {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Provider kind key ("google", "github", ...)
    pub name: String,
    pub display_name: String,

    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,

    pub redirect_url: String,
    pub is_enabled: bool,

    pub scopes: Vec<String>,

    // Endpoint overrides; empty string means "use the kind's default"
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider kinds with built-in endpoint and field-mapping knowledge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Github,
    Microsoft,
    Facebook,
    Generic,
}

impl ProviderKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "google" => ProviderKind::Google,
            "github" => ProviderKind::Github,
            "microsoft" => ProviderKind::Microsoft,
            "facebook" => ProviderKind::Facebook,
            _ => ProviderKind::Generic,
        }
    }

    pub fn authorization_url(&self) -> &'static str {
        match self {
            ProviderKind::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            ProviderKind::Github => "https://github.com/login/oauth/authorize",
            ProviderKind::Microsoft => {
                "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
            }
            ProviderKind::Facebook => "https://www.facebook.com/v18.0/dialog/oauth",
            ProviderKind::Generic => "",
        }
    }

    pub fn token_url(&self) -> &'static str {
        match self {
            ProviderKind::Google => "https://oauth2.googleapis.com/token",
            ProviderKind::Github => "https://github.com/login/oauth/access_token",
            ProviderKind::Microsoft => {
                "https://login.microsoftonline.com/common/oauth2/v2.0/token"
            }
            ProviderKind::Facebook => "https://graph.facebook.com/v18.0/oauth/access_token",
            ProviderKind::Generic => "",
        }
    }

    pub fn userinfo_url(&self) -> &'static str {
        match self {
            ProviderKind::Google => "https://openidconnect.googleapis.com/v1/userinfo",
            ProviderKind::Github => "https://api.github.com/user",
            ProviderKind::Microsoft => "https://graph.microsoft.com/v1.0/me",
            ProviderKind::Facebook => {
                "https://graph.facebook.com/me?fields=id,name,email,first_name,last_name"
            }
            ProviderKind::Generic => "",
        }
    }

    pub fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Google => &["openid", "email", "profile"],
            ProviderKind::Github => &["read:user", "user:email"],
            ProviderKind::Microsoft => &["openid", "email", "profile", "User.Read"],
            ProviderKind::Facebook => &["email", "public_profile"],
            ProviderKind::Generic => &["openid", "email", "profile"],
        }
    }

    /// Provider-specific query parameters appended to the authorize URL.
    pub fn extra_authorize_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            // Google only returns a refresh token when offline access is
            // requested with a forced consent prompt.
            ProviderKind::Google => &[("access_type", "offline"), ("prompt", "consent")],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Google => write!(f, "google"),
            ProviderKind::Github => write!(f, "github"),
            ProviderKind::Microsoft => write!(f, "microsoft"),
            ProviderKind::Facebook => write!(f, "facebook"),
            ProviderKind::Generic => write!(f, "generic"),
        }
    }
}

/// One identity shape for every provider's profile payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedIdentity {
    pub provider: String,
    pub external_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Server-side relay state for one browser round trip to an external
/// provider. Stored under a random nonce, bounded TTL, deleted on first use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialRelayState {
    pub provider_id: Uuid,
    pub tenant_id: Uuid,
    pub nonce: String,
    /// When set, the callback continues into the local authorization-code
    /// flow on behalf of this original OAuth client.
    pub oauth: Option<RelayedOAuthParams>,
    pub created_at: DateTime<Utc>,
}

/// The original requester's OAuth parameters, held server-side for the
/// duration of the social round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayedOAuthParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_name_falls_back_to_generic() {
        assert_eq!(ProviderKind::from_name("google"), ProviderKind::Google);
        assert_eq!(ProviderKind::from_name("github"), ProviderKind::Github);
        assert_eq!(ProviderKind::from_name("okta"), ProviderKind::Generic);
    }

    #[test]
    fn test_google_requests_offline_access() {
        let params = ProviderKind::Google.extra_authorize_params();
        assert!(params.contains(&("access_type", "offline")));
        assert!(ProviderKind::Github.extra_authorize_params().is_empty());
    }

    #[test]
    fn test_client_secret_never_serialized() {
        let provider = SocialProvider {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "google".to_string(),
            display_name: "Google".to_string(),
            client_id: "cid".to_string(),
            client_secret: "supersecret".to_string(),
            redirect_url: "https://id.example.com/auth/google/callback".to_string(),
            is_enabled: true,
            scopes: vec![],
            authorize_url: String::new(),
            token_url: String::new(),
            userinfo_url: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&provider).unwrap();
        assert!(!json.contains("supersecret"));
    }
}
