// Core modules
pub mod client;
pub mod oauth2;
pub mod social;
pub mod tenant;
pub mod twofactor;
pub mod user;

// Re-export commonly used types
pub use client::{Client, ClientType, ClientWithSecret, NewClient};
pub use oauth2::{
    AccessTokenRecord, AuthorizationCode, AuthorizationRequest, AuthorizeParams,
    CreateAuthorizationCode, CreateAuthorizationRequest, CreateRefreshToken, Jwk, Jwks,
    OidcDiscovery, RefreshTokenRecord, SigningKey, TokenError, TokenRequest, TokenResponse,
};
pub use social::{
    NormalizedIdentity, ProviderKind, RelayedOAuthParams, SocialProvider, SocialRelayState,
};
pub use tenant::{BrandingSettings, NewTenant, Tenant, TenantSettings};
pub use twofactor::{TwoFactorSession, TwoFactorSetup, TwoFactorStatus};
pub use user::{NewUser, User, UserProfile};
