use crate::middleware::MaybeTenant;
use crate::AppState;
use aegis_auth::{AuthError, LoginOutcome, LoginRequest, RegisterRequest};
use aegis_tenant::TenantContext;
use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

impl ErrorResponse {
    pub fn new(error: &str, description: &str) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.to_string(),
        }
    }
}

/// Map a core error onto an HTTP status and a sanitized body. Credential
/// failures share one wire message; the cause was already logged where it
/// was detected.
pub fn error_response(e: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    let code = e.oauth2_code();
    let status = match code {
        "invalid_request" | "invalid_grant" => StatusCode::BAD_REQUEST,
        "invalid_client" | "unauthorized" => StatusCode::UNAUTHORIZED,
        "access_denied" => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let description = match &e {
        AuthError::InvalidCredentials => "invalid credentials".to_string(),
        AuthError::ValidationError(msg) | AuthError::InvalidRequest(msg) => msg.clone(),
        AuthError::AccessDenied(msg) => msg.clone(),
        AuthError::Unauthorized(msg) => msg.clone(),
        AuthError::InvalidGrant(msg) => msg.clone(),
        AuthError::TokenExpired => "token expired".to_string(),
        AuthError::NoTenant => "no tenant resolved for request".to_string(),
        other => {
            tracing::error!("Request failed: {}", other);
            "internal error".to_string()
        }
    };

    (status, Json(ErrorResponse::new(code, &description)))
}

/// A tenant is mandatory here; its absence is a distinct failure, never a
/// silent default.
pub fn require_tenant(
    tenant: &MaybeTenant,
) -> Result<TenantContext, (StatusCode, Json<ErrorResponse>)> {
    tenant.0.clone().ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "invalid_request",
                "no tenant resolved for request",
            )),
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct VerifySessionRequest {
    pub session_token: String,
    pub code: String,
}

/// POST /login
/// Direct credential login. May return a two_factor_required outcome
/// instead of tokens.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginOutcome>, (StatusCode, Json<ErrorResponse>)> {
    let ctx = require_tenant(&tenant)?;

    let outcome = state
        .auth_service
        .authenticate(&ctx.tenant, request)
        .await
        .map_err(error_response)?;

    Ok(Json(outcome))
}

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<LoginOutcome>, (StatusCode, Json<ErrorResponse>)> {
    let ctx = require_tenant(&tenant)?;

    let outcome = state
        .auth_service
        .register(&ctx.tenant, request)
        .await
        .map_err(error_response)?;

    Ok(Json(outcome))
}
