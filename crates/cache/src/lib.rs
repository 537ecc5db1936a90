pub mod error;
pub mod redis_cache;

pub use error::{CacheError, Result};
pub use redis_cache::{relay_state_key, twofactor_attempts_key, Cache, CacheConfig};
