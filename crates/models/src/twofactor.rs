use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ephemeral record linking a user and client to a pending second-factor
/// verification. Expires independently of the login attempt that created it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TwoFactorSession {
    pub id: Uuid,
    pub session_token_hash: String,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub client_id: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TwoFactorSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Returned from 2FA setup: the pending secret, shown once.
#[derive(Debug, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_uri: String,
    /// PNG, base64-encoded
    pub qr_code: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub pending: bool,
    pub backup_codes_remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_expiry_boundary() {
        let now = Utc::now();
        let session = TwoFactorSession {
            id: Uuid::new_v4(),
            session_token_hash: "abc".to_string(),
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: None,
            verified_at: None,
            expires_at: now + Duration::minutes(5),
            created_at: now,
        };

        assert!(!session.is_expired(now));
        assert!(!session.is_expired(now + Duration::minutes(4)));
        assert!(session.is_expired(now + Duration::minutes(5)));
        assert!(session.is_expired(now + Duration::minutes(6)));
    }
}
