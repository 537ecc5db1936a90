use aegis_cache::CacheConfig;
use aegis_database::DatabaseConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Public base URL, used as the token issuer
    pub public_url: String,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let server_host =
            std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        Self {
            public_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", server_port)),
            server_host,
            server_port,
            database: DatabaseConfig::from_env(),
            cache: CacheConfig::from_env(),
        }
    }
}
