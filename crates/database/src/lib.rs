pub mod connection;
pub mod error;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{DatabaseError, Result};
pub use repositories::{
    AuthCodeRepository, ClientRepository, CodeConsumeFailure, KeyRepository,
    SocialProviderRepository, TenantRepository, TokenRepository, TwoFactorRepository,
    UserRepository,
};
pub use repositories::tokens::hash_token;
