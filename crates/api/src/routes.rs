use crate::handlers;
use crate::middleware;
use crate::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Two-factor lifecycle requires a valid access token, except
    // verify-session which authenticates by session token.
    let twofactor = Router::new()
        .route("/2fa/setup", post(handlers::twofactor::setup))
        .route("/2fa/enable", post(handlers::twofactor::enable))
        .route("/2fa/disable", post(handlers::twofactor::disable))
        .route("/2fa/verify", post(handlers::twofactor::verify))
        .route("/2fa/status", get(handlers::twofactor::status))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let core = Router::new()
        // OIDC discovery; both spellings are served
        .route(
            "/.well-known/openid_configuration",
            get(handlers::oauth2::openid_configuration),
        )
        .route(
            "/.well-known/openid-configuration",
            get(handlers::oauth2::openid_configuration),
        )
        .route("/.well-known/jwks.json", get(handlers::oauth2::jwks))
        // Authorization-Code(+PKCE) flow
        .route(
            "/oauth/authorize",
            get(handlers::oauth2::authorize).post(handlers::oauth2::authorize_submit),
        )
        .route("/oauth/token", post(handlers::oauth2::token))
        .route("/oauth/revoke", post(handlers::oauth2::revoke))
        // Direct credential login and registration
        .route("/login", post(handlers::auth::login))
        .route("/register", post(handlers::auth::register))
        // Two-factor verification for pending login sessions
        .route(
            "/2fa/verify-session",
            post(handlers::twofactor::verify_session),
        )
        .merge(twofactor)
        // Social federation: entry, OAuth continuation, callback
        .route("/auth/providers", get(handlers::social::list_providers))
        .route("/auth/:provider/login", get(handlers::social::social_login))
        .route("/auth/:provider/oauth", get(handlers::social::social_oauth))
        .route(
            "/auth/:provider/callback",
            get(handlers::social::social_callback),
        );

    Router::new()
        // Tenant-scoped variants live under a path prefix; the path wins
        // over header and host resolution.
        .nest("/tenant/:tenant_id", core.clone())
        .merge(core)
        .route("/health", get(handlers::health::health_check))
        .route("/setup", post(handlers::setup::complete_setup))
        .layer(from_fn_with_state(state.clone(), middleware::resolve_tenant))
        .with_state(state)
}
