use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Mutex;
use tracing::{info, warn};

const SETUP_TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
struct SetupToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

/// First-boot bootstrap secret. Process-wide singleton state owned by the
/// service instance and mutated only under this mutex; it lives outside the
/// request-scoped store.
pub struct SetupTokenState {
    token: Mutex<Option<SetupToken>>,
}

impl Default for SetupTokenState {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupTokenState {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    /// Issue a fresh setup token, replacing any outstanding one. The secret
    /// is returned once (typically logged at startup).
    pub fn issue(&self) -> String {
        self.issue_at(Utc::now())
    }

    fn issue_at(&self, now: DateTime<Utc>) -> String {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(40)
            .map(char::from)
            .collect();

        let mut guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(SetupToken {
            secret: secret.clone(),
            expires_at: now + Duration::minutes(SETUP_TOKEN_TTL_MINUTES),
        });

        info!("Issued setup token (valid {} minutes)", SETUP_TOKEN_TTL_MINUTES);

        secret
    }

    /// Consume the token: a matching, unexpired secret clears the state and
    /// returns true; everything else leaves any live token in place.
    pub fn consume(&self, candidate: &str) -> bool {
        self.consume_at(candidate, Utc::now())
    }

    fn consume_at(&self, candidate: &str, now: DateTime<Utc>) -> bool {
        let mut guard = self.token.lock().unwrap_or_else(|e| e.into_inner());

        match guard.as_ref() {
            None => false,
            Some(token) if now >= token.expires_at => {
                warn!("Setup token presented after expiry");
                *guard = None;
                false
            }
            Some(token) if token.secret == candidate => {
                *guard = None;
                true
            }
            Some(_) => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        let guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
        matches!(guard.as_ref(), Some(token) if Utc::now() < token.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_is_single_use() {
        let state = SetupTokenState::new();
        let secret = state.issue();

        assert!(state.is_pending());
        assert!(state.consume(&secret));
        // Second attempt with the same secret fails
        assert!(!state.consume(&secret));
        assert!(!state.is_pending());
    }

    #[test]
    fn test_wrong_secret_keeps_token_alive() {
        let state = SetupTokenState::new();
        let secret = state.issue();

        assert!(!state.consume("not-the-secret"));
        assert!(state.consume(&secret));
    }

    #[test]
    fn test_expired_token_fails_closed() {
        let state = SetupTokenState::new();
        let past = Utc::now() - Duration::hours(2);
        let secret = state.issue_at(past);

        assert!(!state.consume_at(&secret, Utc::now()));
        // Expiry clears the slot entirely
        assert!(!state.is_pending());
    }

    #[test]
    fn test_reissue_replaces_previous_token() {
        let state = SetupTokenState::new();
        let first = state.issue();
        let second = state.issue();

        assert!(!state.consume(&first));
        assert!(state.consume(&second));
    }
}
