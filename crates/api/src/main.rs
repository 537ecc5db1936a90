// Aegis API Server
// Multi-tenant OAuth2 / OpenID Connect authorization server

mod config;
mod handlers;
mod middleware;
mod routes;

use aegis_auth::{
    AuthService, KeyManager, OAuth2Service, SetupTokenState, SocialBroker, TwoFactorService,
};
use aegis_database::TenantRepository;
use aegis_tenant::TenantResolver;
use config::Config;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub struct AppState {
    pub config: Config,
    pub db: aegis_database::Database,
    pub cache: aegis_cache::Cache,
    pub resolver: TenantResolver,
    pub keys: Arc<KeyManager>,
    pub oauth2_service: Arc<OAuth2Service>,
    pub auth_service: AuthService,
    pub twofactor_service: Arc<TwoFactorService>,
    pub social_broker: SocialBroker,
    pub setup: SetupTokenState,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,aegis_api=debug,tower_http=debug".to_string()),
        )
        .init();

    tracing::info!("Starting Aegis authorization server");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    tracing::info!("Server: {}:{}", config.server_host, config.server_port);
    tracing::info!("Issuer: {}", config.public_url);

    tracing::info!("Connecting to database...");
    let database = aegis_database::Database::new(config.database.clone())
        .await
        .expect("Failed to connect to database");
    database.ping().await.expect("Database ping failed");
    tracing::info!("Database connected");

    tracing::info!("Connecting to Redis...");
    let cache = aegis_cache::Cache::new(config.cache.clone())
        .await
        .expect("Failed to connect to Redis");
    cache.ping().await.expect("Redis ping failed");
    tracing::info!("Redis connected");

    let key_repo = aegis_database::KeyRepository::new(database.pool().clone());
    let keys = Arc::new(
        KeyManager::bootstrap(&key_repo)
            .await
            .expect("Failed to initialize signing keys"),
    );
    tracing::info!("Signing keys ready (active kid: {})", keys.active_kid()?);

    let oauth2_service = Arc::new(OAuth2Service::new(
        &database,
        keys.clone(),
        config.public_url.clone(),
    ));
    let twofactor_service = Arc::new(TwoFactorService::new(&database, cache.clone()));
    let auth_service = AuthService::new(&database, twofactor_service.clone(), oauth2_service.clone());
    let social_broker = SocialBroker::new(&database, cache.clone(), oauth2_service.clone())
        .expect("Failed to initialize social broker");
    let resolver = TenantResolver::new(TenantRepository::new(database.pool().clone()));
    tracing::info!("Services initialized");

    // First boot: no tenants yet means the instance needs bootstrapping.
    // The setup token is process-wide state with its own expiry.
    let setup = SetupTokenState::new();
    let tenant_count = TenantRepository::new(database.pool().clone()).count().await?;
    if tenant_count == 0 {
        let token = setup.issue();
        tracing::warn!("No tenants found. Complete setup with POST /setup");
        tracing::warn!("Setup token: {}", token);
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        db: database,
        cache,
        resolver,
        keys,
        oauth2_service,
        auth_service,
        twofactor_service,
        social_broker,
        setup,
    });

    let app = routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server ready at http://{}", addr);

    axum::serve(listener, app).await.expect("Server error");

    Ok(())
}
