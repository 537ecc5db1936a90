pub mod error;
pub mod keys;
pub mod mfa;
pub mod oauth2_service;
pub mod password;
pub mod scope;
pub mod service;
pub mod setup;
pub mod social;
pub mod twofactor;

pub use error::{AuthError, Result};
pub use keys::KeyManager;
pub use oauth2_service::{AccessTokenClaims, IdTokenClaims, OAuth2Service};
pub use password::PasswordHasher;
pub use service::{AuthService, CredentialCheck, LoginOutcome, LoginRequest, RegisterRequest};
pub use setup::SetupTokenState;
pub use social::SocialBroker;
pub use twofactor::TwoFactorService;
