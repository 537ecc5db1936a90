use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Core error taxonomy. Variants map onto OAuth2 wire codes at the HTTP
/// boundary; authentication failures are homogenized there while the distinct
/// cause is logged where it is detected.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid client")]
    InvalidClient,

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("No tenant resolved")]
    NoTenant,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("External provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(#[from] aegis_database::DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] aegis_cache::CacheError),

    #[error("Password hashing error: {0}")]
    PasswordHashError(String),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// The OAuth2 error code this variant surfaces as on a standard
    /// endpoint.
    pub fn oauth2_code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) | AuthError::ValidationError(_) => "invalid_request",
            AuthError::InvalidClient => "invalid_client",
            AuthError::InvalidGrant(_) => "invalid_grant",
            AuthError::AccessDenied(_) => "access_denied",
            AuthError::InvalidCredentials
            | AuthError::Unauthorized(_)
            | AuthError::TokenExpired => "unauthorized",
            AuthError::NoTenant | AuthError::NotFound(_) => "invalid_request",
            _ => "server_error",
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHashError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::JwtError(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::ValidationError(err.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Provider(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth2_code_mapping() {
        assert_eq!(AuthError::InvalidClient.oauth2_code(), "invalid_client");
        assert_eq!(
            AuthError::InvalidGrant("used".into()).oauth2_code(),
            "invalid_grant"
        );
        assert_eq!(AuthError::InvalidCredentials.oauth2_code(), "unauthorized");
        assert_eq!(
            AuthError::AccessDenied("inactive".into()).oauth2_code(),
            "access_denied"
        );
        assert_eq!(
            AuthError::Internal("boom".into()).oauth2_code(),
            "server_error"
        );
    }
}
