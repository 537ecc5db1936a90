use crate::handlers::auth::ErrorResponse;
use crate::middleware::MaybeTenant;
use crate::AppState;
use aegis_auth::social::SocialLoginOutcome;
use aegis_auth::LoginOutcome;
use aegis_models::{AuthorizeParams, RelayedOAuthParams};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Debug, Deserialize)]
pub struct SocialCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Embedded OAuth parameters carried by the continuation entry point.
#[derive(Debug, Deserialize)]
pub struct SocialOAuthQuery {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

fn provider_name(params: &HashMap<String, String>) -> Option<String> {
    params.get("provider").cloned()
}

fn redirect_to_login_with_error(error: &str) -> Response {
    let url = format!("/login?error={}", urlencoding::encode(error));
    Redirect::temporary(&url).into_response()
}

/// GET /auth/:provider/login
/// Plain social login: round trip to the provider, then a direct token
/// triple.
pub async fn social_login(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Path(params): Path<HashMap<String, String>>,
) -> Response {
    let ctx = match &tenant.0 {
        Some(ctx) => ctx.clone(),
        None => return redirect_to_login_with_error("no tenant resolved"),
    };

    let provider = match provider_name(&params) {
        Some(provider) => provider,
        None => return redirect_to_login_with_error("unknown provider"),
    };

    match state
        .social_broker
        .begin_login(&ctx.tenant, &provider, None)
        .await
    {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => {
            warn!(provider = %provider, "Social login rejected: {}", e);
            redirect_to_login_with_error("social login is not available")
        }
    }
}

/// GET /auth/:provider/oauth
/// OAuth-continuation entry: the original client's parameters ride along and
/// are held server-side for the duration of the provider round trip.
pub async fn social_oauth(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Path(params): Path<HashMap<String, String>>,
    Query(oauth): Query<SocialOAuthQuery>,
) -> Response {
    let ctx = match &tenant.0 {
        Some(ctx) => ctx.clone(),
        None => return redirect_to_login_with_error("no tenant resolved"),
    };

    let provider = match provider_name(&params) {
        Some(provider) => provider,
        None => return redirect_to_login_with_error("unknown provider"),
    };

    // The embedded parameters must describe a valid client before the round
    // trip begins; they are never re-trusted at the callback.
    let authorize = AuthorizeParams {
        client_id: oauth.client_id.clone(),
        redirect_uri: oauth.redirect_uri.clone(),
        response_type: "code".to_string(),
        scope: oauth.scope.clone(),
        state: oauth.state.clone(),
        code_challenge: oauth.code_challenge.clone(),
        code_challenge_method: oauth.code_challenge_method.clone(),
        nonce: oauth.nonce.clone(),
        email: None,
        password: None,
        totp_code: None,
        request_id: None,
    };

    if let Err(e) = state
        .oauth2_service
        .validate_authorize_request(ctx.tenant_id, &authorize)
        .await
    {
        warn!(provider = %provider, "Social OAuth continuation rejected: {}", e);
        return redirect_to_login_with_error("invalid authorization request");
    }

    let relayed = RelayedOAuthParams {
        client_id: oauth.client_id,
        redirect_uri: oauth.redirect_uri,
        scope: oauth.scope,
        state: oauth.state,
        code_challenge: oauth.code_challenge,
        code_challenge_method: oauth.code_challenge_method,
        nonce: oauth.nonce,
    };

    match state
        .social_broker
        .begin_login(&ctx.tenant, &provider, Some(relayed))
        .await
    {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => {
            warn!(provider = %provider, "Social login rejected: {}", e);
            redirect_to_login_with_error("social login is not available")
        }
    }
}

/// GET /auth/:provider/callback
pub async fn social_callback(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<SocialCallbackQuery>,
) -> Response {
    let ctx = match &tenant.0 {
        Some(ctx) => ctx.clone(),
        None => return redirect_to_login_with_error("no tenant resolved"),
    };

    let provider = match provider_name(&params) {
        Some(provider) => provider,
        None => return redirect_to_login_with_error("unknown provider"),
    };

    if let Some(error) = query.error {
        let description = query
            .error_description
            .unwrap_or_else(|| "login was cancelled".to_string());
        warn!(provider = %provider, error = %error, "Provider returned an error");
        return redirect_to_login_with_error(&description);
    }

    let (code, relay_state) = match (query.code, query.state) {
        (Some(code), Some(state)) => (code, state),
        _ => return redirect_to_login_with_error("missing code or state"),
    };

    match state
        .social_broker
        .handle_callback(&ctx.tenant, &provider, &code, &relay_state)
        .await
    {
        Ok(SocialLoginOutcome::AuthorizationRedirect { redirect_url }) => {
            Redirect::temporary(&redirect_url).into_response()
        }
        Ok(SocialLoginOutcome::Tokens { tokens, user }) => {
            (StatusCode::OK, Json(LoginOutcome::Success { tokens, user })).into_response()
        }
        Err(e) => {
            error!(provider = %provider, "Social callback failed: {}", e);
            redirect_to_login_with_error("failed to complete login")
        }
    }
}

/// GET /auth/providers
/// Enabled providers for the login surface; disabled rows never appear.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
) -> Result<Json<Vec<aegis_models::SocialProvider>>, (StatusCode, Json<ErrorResponse>)> {
    let ctx = crate::handlers::auth::require_tenant(&tenant)?;

    let providers = aegis_database::SocialProviderRepository::new(state.db.pool().clone())
        .list_enabled(ctx.tenant_id)
        .await
        .map_err(|e| {
            error!("Provider listing failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("server_error", "internal error")),
            )
        })?;

    Ok(Json(providers))
}
