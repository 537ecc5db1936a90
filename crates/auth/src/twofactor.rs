use crate::error::{AuthError, Result};
use crate::mfa;
use aegis_cache::Cache;
use aegis_database::{Database, TwoFactorRepository, UserRepository};
use aegis_models::{TwoFactorSetup, TwoFactorStatus, User};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, warn};
use uuid::Uuid;

const TOTP_ISSUER: &str = "Aegis";

/// Verification attempts allowed per user per window before throttling.
const MAX_ATTEMPTS: i64 = 10;
const ATTEMPT_WINDOW_SECONDS: u64 = 300;

/// Per-user state machine: disabled -> setup_pending -> enabled.
pub struct TwoFactorService {
    users: UserRepository,
    repo: TwoFactorRepository,
    cache: Cache,
}

impl TwoFactorService {
    pub fn new(db: &Database, cache: Cache) -> Self {
        let pool = db.pool().clone();

        Self {
            users: UserRepository::new(pool.clone()),
            repo: TwoFactorRepository::new(pool),
            cache,
        }
    }

    /// disabled -> setup_pending: stage a secret and a fresh backup-code
    /// set. Nothing becomes active until `enable` confirms a code.
    pub async fn setup(&self, user: &User) -> Result<TwoFactorSetup> {
        let secret = mfa::generate_secret();
        let otpauth_uri = mfa::generate_totp_uri(&secret, &user.email, TOTP_ISSUER);
        let qr_png = mfa::generate_qr_code(&otpauth_uri)?;

        let backup_codes = mfa::generate_backup_codes();
        let hashes = backup_codes
            .iter()
            .map(|code| mfa::hash_backup_code(code))
            .collect::<Result<Vec<_>>>()?;

        self.users.stage_mfa_secret(user.id, &secret).await?;
        self.repo.replace_backup_codes(user.id, &hashes).await?;

        info!(user_id = %user.id, "Two-factor setup pending");

        Ok(TwoFactorSetup {
            secret,
            otpauth_uri,
            qr_code: STANDARD.encode(&qr_png),
            backup_codes,
        })
    }

    /// setup_pending -> enabled, on a valid code against the pending secret.
    /// A failed code keeps the pending state so the user can retry.
    pub async fn enable(&self, user: &User, code: &str) -> Result<()> {
        let pending = user
            .mfa_pending_secret
            .as_deref()
            .ok_or_else(|| AuthError::InvalidRequest("no pending enrollment".to_string()))?;

        if !mfa::verify_totp(pending, code)? {
            warn!(user_id = %user.id, "Two-factor enable failed: bad code");
            return Err(AuthError::Unauthorized("invalid code".to_string()));
        }

        self.users.activate_mfa(user.id).await?;

        info!(user_id = %user.id, "Two-factor enabled");

        Ok(())
    }

    /// enabled -> disabled. Clears the secret and the backup-code set.
    pub async fn disable(&self, user: &User) -> Result<()> {
        self.users.disable_mfa(user.id).await?;
        self.repo.delete_backup_codes(user.id).await?;

        info!(user_id = %user.id, "Two-factor disabled");

        Ok(())
    }

    /// Accept a live TOTP within the tolerance window, or a backup code.
    /// Each backup code is single-use: consuming one deletes it, so the set
    /// only ever shrinks until a re-setup.
    pub async fn verify(&self, user: &User, code: &str) -> Result<bool> {
        self.throttle(user.id).await?;

        let secret = match user.mfa_secret.as_deref() {
            Some(secret) if user.mfa_enabled => secret,
            _ => {
                warn!(user_id = %user.id, "Two-factor verify on account without active secret");
                return Ok(false);
            }
        };

        if mfa::verify_totp(secret, code)? {
            return Ok(true);
        }

        // Fall back to backup codes
        for (id, hash) in self.repo.list_backup_code_hashes(user.id).await? {
            if mfa::verify_backup_code(code, &hash)? {
                let consumed = self.repo.consume_backup_code(id).await?;
                if consumed {
                    info!(user_id = %user.id, "Backup code consumed");
                }
                return Ok(consumed);
            }
        }

        Ok(false)
    }

    pub async fn status(&self, user: &User) -> Result<TwoFactorStatus> {
        let remaining = self.repo.count_backup_codes(user.id).await?;

        Ok(TwoFactorStatus {
            enabled: user.mfa_enabled,
            pending: user.mfa_pending_secret.is_some(),
            backup_codes_remaining: remaining,
        })
    }

    async fn throttle(&self, user_id: Uuid) -> Result<()> {
        let key = aegis_cache::twofactor_attempts_key(&user_id.to_string());
        let attempts = self.cache.incr_with_ttl(&key, ATTEMPT_WINDOW_SECONDS).await?;

        if attempts > MAX_ATTEMPTS {
            warn!(user_id = %user_id, attempts, "Two-factor verification throttled");
            return Err(AuthError::AccessDenied(
                "too many verification attempts".to_string(),
            ));
        }

        Ok(())
    }
}
