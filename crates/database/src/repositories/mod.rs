pub mod clients;
pub mod codes;
pub mod keys;
pub mod providers;
pub mod tenants;
pub mod tokens;
pub mod twofactor;
pub mod users;

pub use clients::ClientRepository;
pub use codes::{AuthCodeRepository, CodeConsumeFailure};
pub use keys::KeyRepository;
pub use providers::SocialProviderRepository;
pub use tenants::TenantRepository;
pub use tokens::TokenRepository;
pub use twofactor::TwoFactorRepository;
pub use users::UserRepository;
