use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// OAuth2 client application, scoped to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub tenant_id: Uuid,

    pub name: String,
    pub client_id: String,

    /// Hashed client secret; plaintext is only returned at create/regenerate
    /// time. NULL for public clients.
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,

    pub client_type: ClientType,

    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn allows_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }
}

/// Client with plaintext secret, only returned on create/regenerate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientWithSecret {
    #[serde(flatten)]
    pub client: Client,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewClient {
    pub tenant_id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    pub client_type: ClientType,

    #[validate(length(min = 1))]
    pub redirect_uris: Vec<String>,

    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    #[serde(default)]
    pub grant_types: Vec<String>,
}

/// Client type. Public clients authenticate with PKCE, confidential clients
/// with a client secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Public,
    Confidential,
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientType::Public => write!(f, "public"),
            ClientType::Confidential => write!(f, "confidential"),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for ClientType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("TEXT")
    }
}

impl sqlx::Decode<'_, sqlx::Postgres> for ClientType {
    fn decode(
        value: sqlx::postgres::PgValueRef<'_>,
    ) -> Result<Self, Box<dyn std::error::Error + 'static + Send + Sync>> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "public" => Ok(ClientType::Public),
            "confidential" => Ok(ClientType::Confidential),
            _ => Err(format!("Invalid client type: {}", s).into()),
        }
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for ClientType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            ClientType::Public => "public",
            ClientType::Confidential => "confidential",
        };
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(s, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client() -> Client {
        Client {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Dashboard".to_string(),
            client_id: "dash-web".to_string(),
            client_secret_hash: Some("$2b$12$abcdef".to_string()),
            client_type: ClientType::Confidential,
            redirect_uris: vec!["https://app.example.com/callback".to_string()],
            allowed_scopes: vec!["openid".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_redirect_uri_exact_match_only() {
        let client = sample_client();
        assert!(client.allows_redirect_uri("https://app.example.com/callback"));
        assert!(!client.allows_redirect_uri("https://app.example.com/callback/"));
        assert!(!client.allows_redirect_uri("https://app.example.com"));
    }

    #[test]
    fn test_secret_hash_never_serialized() {
        let json = serde_json::to_string(&sample_client()).unwrap();
        assert!(!json.contains("client_secret_hash"));
        assert!(!json.contains("$2b$12$"));
    }
}
