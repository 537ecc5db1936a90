use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// An isolated organization namespace. Tenants are soft-deleted: `is_active`
/// flips to false, rows are never removed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,

    /// Full custom domain mapped to this tenant (e.g. "login.acme.com")
    pub domain: Option<String>,

    /// Subdomain under the deployment's base host (e.g. "acme")
    pub subdomain: Option<String>,

    pub is_active: bool,

    /// At most one tenant system-wide carries this flag
    pub is_default: bool,

    #[sqlx(json)]
    pub settings: TenantSettings,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tenant settings (JSON stored in database)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    #[serde(default = "default_allow_registration")]
    pub allow_registration: bool,

    #[serde(default)]
    pub mfa_required: bool,

    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: i64,

    #[serde(default)]
    pub branding: BrandingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrandingSettings {
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub favicon_url: Option<String>,
}

fn default_allow_registration() -> bool {
    true
}

fn default_session_timeout_minutes() -> i64 {
    60
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            allow_registration: true,
            mfa_required: false,
            session_timeout_minutes: 60,
            branding: BrandingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTenant {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    pub domain: Option<String>,

    #[validate(length(min = 1, max = 63))]
    pub subdomain: Option<String>,

    #[serde(default)]
    pub is_default: bool,

    pub settings: Option<TenantSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings: TenantSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.allow_registration);
        assert!(!settings.mfa_required);
        assert_eq!(settings.session_timeout_minutes, 60);
        assert!(settings.branding.logo_url.is_none());
    }

    #[test]
    fn test_settings_roundtrip() {
        let settings = TenantSettings {
            allow_registration: false,
            mfa_required: true,
            session_timeout_minutes: 15,
            branding: BrandingSettings {
                logo_url: Some("https://cdn.example.com/logo.png".to_string()),
                primary_color: Some("#20615b".to_string()),
                favicon_url: None,
            },
        };

        let json = serde_json::to_string(&settings).unwrap();
        let parsed: TenantSettings = serde_json::from_str(&json).unwrap();
        assert!(!parsed.allow_registration);
        assert!(parsed.mfa_required);
        assert_eq!(parsed.session_timeout_minutes, 15);
        assert_eq!(parsed.branding.primary_color.as_deref(), Some("#20615b"));
    }
}
