pub mod auth;
pub mod tenant;

pub use auth::{require_auth, CurrentUser};
pub use tenant::{resolve_tenant, MaybeTenant};
