use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Unique per tenant
    pub email: String,
    pub username: Option<String>,

    /// NULL for social-only accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    pub first_name: Option<String>,
    pub last_name: Option<String>,

    /// Group memberships (names, tenant-scoped)
    pub groups: Vec<String>,

    /// Granted scopes. Persisted projection: admin and group changes write
    /// through here, token issuance reads this column at exchange time.
    pub scopes: Vec<String>,

    pub is_active: bool,

    // Two-factor state. The secret only becomes active once enrollment is
    // confirmed with a valid code.
    pub mfa_enabled: bool,
    #[serde(skip_serializing)]
    pub mfa_secret: Option<String>,
    #[serde(skip_serializing)]
    pub mfa_pending_secret: Option<String>,

    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    pub tenant_id: Uuid,

    #[validate(email)]
    pub email: String,

    pub username: Option<String>,

    /// None for social-only accounts
    #[validate(length(min = 8))]
    pub password: Option<String>,

    pub first_name: Option<String>,
    pub last_name: Option<String>,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Outward-facing user shape. Never carries the password hash or any
/// two-factor secret material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub groups: Vec<String>,
    pub scopes: Vec<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            groups: user.groups,
            scopes: user.scopes,
            mfa_enabled: user.mfa_enabled,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            email: "jane@example.com".to_string(),
            username: Some("jane".to_string()),
            password_hash: Some("$argon2id$...".to_string()),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            groups: vec!["staff".to_string()],
            scopes: vec!["openid".to_string(), "profile".to_string()],
            is_active: true,
            mfa_enabled: false,
            mfa_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            mfa_pending_secret: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_secrets_never_serialized() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("mfa_secret"));
        assert!(!json.contains("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn test_full_name() {
        let mut user = sample_user();
        assert_eq!(user.full_name().as_deref(), Some("Jane Doe"));

        user.last_name = None;
        assert_eq!(user.full_name().as_deref(), Some("Jane"));

        user.first_name = None;
        assert_eq!(user.full_name(), None);
    }
}
