use crate::handlers::auth::ErrorResponse;
use crate::middleware::MaybeTenant;
use crate::AppState;
use aegis_auth::{AuthError, CredentialCheck, LoginOutcome, LoginRequest};
use aegis_models::{
    AuthorizeParams, CreateAuthorizationCode, CreateAuthorizationRequest, Jwks, OidcDiscovery,
    TokenError, TokenRequest,
};
use aegis_tenant::TenantContext;
use axum::{
    extract::{OriginalUri, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use std::sync::Arc;
use tracing::{error, warn};

// ============================================================================
// DISCOVERY / JWKS
// ============================================================================

/// Effective external base URL. Behind a proxy the forwarded protocol wins
/// over the transport the server itself sees.
fn external_base_url(state: &AppState, headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    match headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        Some(host) => format!("{}://{}", scheme, host),
        None => state.config.public_url.clone(),
    }
}

/// GET /.well-known/openid_configuration (underscore and hyphen spellings)
/// Tenant-scoped requests get issuer and endpoints rooted under the tenant
/// path.
pub async fn openid_configuration(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Extension(tenant): Extension<MaybeTenant>,
    headers: HeaderMap,
) -> Json<OidcDiscovery> {
    let base = external_base_url(&state, &headers);

    let discovery = match &tenant.0 {
        Some(ctx) if uri.path().starts_with("/tenant/") => {
            OidcDiscovery::for_tenant(&base, ctx.tenant_id)
        }
        _ => OidcDiscovery::new(&base),
    };

    Json(discovery)
}

/// GET /.well-known/jwks.json
pub async fn jwks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Jwks>, (StatusCode, Json<ErrorResponse>)> {
    let jwks = state.keys.jwks().map_err(|e| {
        error!("Failed to build JWKS: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("server_error", "Failed to retrieve keys")),
        )
    })?;

    Ok(Json(jwks))
}

// ============================================================================
// AUTHORIZATION ENDPOINT
// ============================================================================

fn token_error(e: AuthError) -> (StatusCode, Json<TokenError>) {
    let code = e.oauth2_code();
    let status = match code {
        "invalid_request" | "invalid_grant" => StatusCode::BAD_REQUEST,
        "invalid_client" | "unauthorized" => StatusCode::UNAUTHORIZED,
        "access_denied" => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let description = match &e {
        AuthError::Database(_) | AuthError::Cache(_) | AuthError::Internal(_) => {
            error!("Request failed: {}", e);
            "internal error".to_string()
        }
        AuthError::InvalidCredentials => "invalid credentials".to_string(),
        other => other.to_string(),
    };

    (status, Json(TokenError::new(code, &description)))
}

fn require_tenant_oauth(
    tenant: &MaybeTenant,
) -> Result<TenantContext, (StatusCode, Json<TokenError>)> {
    tenant.0.clone().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(TokenError::invalid_request("no tenant resolved for request")),
        )
    })
}

/// Redirect back to the client with a sanitized error, per the browser-flow
/// contract. Only used once the redirect URI itself has been validated.
fn error_redirect(redirect_uri: &str, code: &str, description: &str, state: Option<&str>) -> Response {
    let url = format!(
        "{}?error={}&error_description={}&state={}",
        redirect_uri,
        urlencoding::encode(code),
        urlencoding::encode(description),
        urlencoding::encode(state.unwrap_or(""))
    );
    Redirect::temporary(&url).into_response()
}

/// An unknown client or unregistered redirect URI must never redirect; any
/// later protocol error goes back to the (validated) client.
fn authorize_error(params: &AuthorizeParams, e: AuthError) -> Response {
    match &e {
        AuthError::InvalidClient => token_error(e).into_response(),
        AuthError::InvalidRequest(msg) if msg.contains("redirect_uri") => {
            token_error(e).into_response()
        }
        _ => {
            let description = e.to_string();
            error_redirect(
                &params.redirect_uri,
                e.oauth2_code(),
                &description,
                params.state.as_deref(),
            )
        }
    }
}

/// GET /oauth/authorize
/// Validates the request, stores it server-side, and sends the browser to
/// the hosted login to authenticate.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let ctx = match require_tenant_oauth(&tenant) {
        Ok(ctx) => ctx,
        Err(rejection) => return rejection.into_response(),
    };

    if let Err(e) = state
        .oauth2_service
        .validate_authorize_request(ctx.tenant_id, &params)
        .await
    {
        return authorize_error(&params, e);
    }

    let request = match state
        .oauth2_service
        .create_authorization_request(CreateAuthorizationRequest {
            tenant_id: ctx.tenant_id,
            client_id: params.client_id.clone(),
            redirect_uri: params.redirect_uri.clone(),
            response_type: params.response_type.clone(),
            scope: params.scope.clone(),
            state: params.state.clone(),
            code_challenge: params.code_challenge.clone(),
            code_challenge_method: params.code_challenge_method.clone(),
            nonce: params.nonce.clone(),
        })
        .await
    {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to store authorization request: {}", e);
            return error_redirect(
                &params.redirect_uri,
                "server_error",
                "internal error",
                params.state.as_deref(),
            );
        }
    };

    let login_url = format!("/login?request_id={}", request.request_id);
    Redirect::temporary(&login_url).into_response()
}

/// POST /oauth/authorize
/// One-step completion: credentials arrive with the OAuth parameters (or a
/// request_id referencing a stored request), and a code is issued on
/// success.
pub async fn authorize_submit(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Form(params): Form<AuthorizeParams>,
) -> Response {
    let ctx = match require_tenant_oauth(&tenant) {
        Ok(ctx) => ctx,
        Err(rejection) => return rejection.into_response(),
    };

    // A stored request (from GET /oauth/authorize) wins over posted
    // parameters; the browser is never trusted to restate them.
    let params = match &params.request_id {
        Some(request_id) => {
            match state.oauth2_service.find_authorization_request(request_id).await {
                Ok(stored) => {
                    let _ = state
                        .oauth2_service
                        .delete_authorization_request(request_id)
                        .await;
                    AuthorizeParams {
                        client_id: stored.client_id,
                        redirect_uri: stored.redirect_uri,
                        response_type: stored.response_type,
                        scope: stored.scope,
                        state: stored.state,
                        code_challenge: stored.code_challenge,
                        code_challenge_method: stored.code_challenge_method,
                        nonce: stored.nonce,
                        email: params.email,
                        password: params.password,
                        totp_code: params.totp_code,
                        request_id: None,
                    }
                }
                Err(e) => return token_error(e).into_response(),
            }
        }
        None => params,
    };

    if let Err(e) = state
        .oauth2_service
        .validate_authorize_request(ctx.tenant_id, &params)
        .await
    {
        return token_error(e).into_response();
    }

    let (email, password) = match (params.email.clone(), params.password.clone()) {
        (Some(email), Some(password)) => (email, password),
        _ => {
            return token_error(AuthError::InvalidRequest(
                "email and password are required".to_string(),
            ))
            .into_response()
        }
    };

    let login = LoginRequest {
        email,
        password,
        totp_code: params.totp_code.clone(),
    };

    let user = match state.auth_service.verify_credentials(&ctx.tenant, &login).await {
        Ok(CredentialCheck::Verified(user)) => *user,
        Ok(CredentialCheck::TwoFactorRequired { session_token }) => {
            // Intermediate outcome: the caller re-submits with a code
            let outcome = LoginOutcome::TwoFactorRequired {
                two_factor_required: true,
                session_token,
                expires_in: 300,
                message: "Verify your identity with a second factor.".to_string(),
            };
            return (StatusCode::OK, Json(outcome)).into_response();
        }
        Err(e) => return token_error(e).into_response(),
    };

    let code = match state
        .oauth2_service
        .create_authorization_code(CreateAuthorizationCode {
            tenant_id: ctx.tenant_id,
            client_id: params.client_id.clone(),
            user_id: user.id,
            redirect_uri: params.redirect_uri.clone(),
            scope: params.scope.clone(),
            code_challenge: params.code_challenge.clone(),
            code_challenge_method: params.code_challenge_method.clone(),
            nonce: params.nonce.clone(),
        })
        .await
    {
        Ok(code) => code,
        Err(e) => {
            error!("Failed to create authorization code: {}", e);
            return error_redirect(
                &params.redirect_uri,
                "server_error",
                "internal error",
                params.state.as_deref(),
            );
        }
    };

    let redirect_url = format!(
        "{}?code={}&state={}",
        params.redirect_uri,
        urlencoding::encode(&code),
        urlencoding::encode(params.state.as_deref().unwrap_or(""))
    );

    Redirect::temporary(&redirect_url).into_response()
}

// ============================================================================
// TOKEN ENDPOINT
// ============================================================================

/// POST /oauth/token
pub async fn token(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    let ctx = match require_tenant_oauth(&tenant) {
        Ok(ctx) => ctx,
        Err(rejection) => return rejection.into_response(),
    };

    let (client_id, client_secret) = extract_client_credentials(&headers, &request);

    match request.grant_type.as_str() {
        "authorization_code" => {
            handle_authorization_code_grant(&state, &ctx, client_id, client_secret, &request)
                .await
        }
        "refresh_token" => handle_refresh_token_grant(&state, &ctx, client_id, &request).await,
        "password" => handle_password_grant(&state, &ctx, &request).await,
        _ => token_error(AuthError::InvalidRequest(format!(
            "unsupported grant_type: {}",
            request.grant_type
        )))
        .into_response(),
    }
}

async fn handle_authorization_code_grant(
    state: &Arc<AppState>,
    ctx: &TenantContext,
    client_id: Option<String>,
    client_secret: Option<String>,
    request: &TokenRequest,
) -> Response {
    let client_id = match client_id {
        Some(id) => id,
        None => {
            return token_error(AuthError::InvalidRequest("client_id is required".to_string()))
                .into_response()
        }
    };

    let code = match request.code.as_deref() {
        Some(code) => code,
        None => {
            return token_error(AuthError::InvalidRequest("code is required".to_string()))
                .into_response()
        }
    };

    let redirect_uri = match request.redirect_uri.as_deref() {
        Some(uri) => uri,
        None => {
            return token_error(AuthError::InvalidRequest(
                "redirect_uri is required".to_string(),
            ))
            .into_response()
        }
    };

    // Confidential clients authenticate with their secret; public clients
    // authenticate with the PKCE verifier and never need a secret.
    let result = match (client_secret, request.code_verifier.as_deref()) {
        (Some(secret), _) => {
            state
                .oauth2_service
                .exchange_code_for_tokens(ctx.tenant_id, &client_id, &secret, code, redirect_uri)
                .await
        }
        (None, Some(verifier)) => {
            state
                .oauth2_service
                .exchange_code_for_tokens_pkce(
                    ctx.tenant_id,
                    &client_id,
                    code,
                    redirect_uri,
                    verifier,
                )
                .await
        }
        (None, None) => {
            return token_error(AuthError::InvalidRequest(
                "client_secret or code_verifier is required".to_string(),
            ))
            .into_response()
        }
    };

    match result {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => {
            warn!(client_id = %client_id, "Code exchange failed: {}", e);
            token_error(e).into_response()
        }
    }
}

async fn handle_refresh_token_grant(
    state: &Arc<AppState>,
    ctx: &TenantContext,
    client_id: Option<String>,
    request: &TokenRequest,
) -> Response {
    let client_id = match client_id {
        Some(id) => id,
        None => {
            return token_error(AuthError::InvalidRequest("client_id is required".to_string()))
                .into_response()
        }
    };

    let refresh_token = match request.refresh_token.as_deref() {
        Some(token) => token,
        None => {
            return token_error(AuthError::InvalidRequest(
                "refresh_token is required".to_string(),
            ))
            .into_response()
        }
    };

    match state
        .oauth2_service
        .refresh_tokens(ctx.tenant_id, &client_id, refresh_token)
        .await
    {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => {
            warn!(client_id = %client_id, "Refresh failed: {}", e);
            token_error(e).into_response()
        }
    }
}

/// Direct-login grant: same credential path as /login, shaped as a token
/// endpoint response.
async fn handle_password_grant(
    state: &Arc<AppState>,
    ctx: &TenantContext,
    request: &TokenRequest,
) -> Response {
    let (username, password) = match (request.username.clone(), request.password.clone()) {
        (Some(username), Some(password)) => (username, password),
        _ => {
            return token_error(AuthError::InvalidRequest(
                "username and password are required".to_string(),
            ))
            .into_response()
        }
    };

    let login = LoginRequest {
        email: username,
        password,
        totp_code: request.totp_code.clone(),
    };

    match state.auth_service.authenticate(&ctx.tenant, login).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => token_error(e).into_response(),
    }
}

// ============================================================================
// REVOCATION
// ============================================================================

#[derive(Debug, serde::Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    pub client_id: Option<String>,
    #[allow(dead_code)]
    pub client_secret: Option<String>,
}

/// POST /oauth/revoke
/// RFC 7009: succeeds silently whether or not the token was known.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    headers: HeaderMap,
    Form(request): Form<RevokeRequest>,
) -> Response {
    if require_tenant_oauth(&tenant).is_err() {
        return (
            StatusCode::BAD_REQUEST,
            Json(TokenError::invalid_request("no tenant resolved for request")),
        )
            .into_response();
    }

    let client_id = basic_auth_credentials(&headers)
        .map(|(id, _)| id)
        .or(request.client_id.clone());

    if let Some(client_id) = client_id {
        if let Err(e) = state.oauth2_service.revoke_token(&client_id, &request.token).await {
            error!("Revocation failed: {}", e);
            return token_error(e).into_response();
        }
    }

    StatusCode::OK.into_response()
}

// ============================================================================
// CLIENT CREDENTIALS EXTRACTION
// ============================================================================

fn basic_auth_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let auth_header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = auth_header.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (id, secret) = credentials.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Client credentials arrive via HTTP Basic auth or form fields; Basic wins.
fn extract_client_credentials(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> (Option<String>, Option<String>) {
    if let Some((id, secret)) = basic_auth_credentials(headers) {
        return (Some(id), Some(secret));
    }

    (request.client_id.clone(), request.client_secret.clone())
}
