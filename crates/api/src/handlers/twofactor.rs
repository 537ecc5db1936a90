use crate::handlers::auth::{error_response, require_tenant, ErrorResponse, VerifySessionRequest};
use crate::middleware::{CurrentUser, MaybeTenant};
use crate::AppState;
use aegis_auth::LoginOutcome;
use aegis_models::{TwoFactorSetup, TwoFactorStatus};
use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

/// POST /2fa/setup
/// Stage a secret and backup codes; nothing becomes active until /2fa/enable
/// confirms a code.
pub async fn setup(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<TwoFactorSetup>, (StatusCode, Json<ErrorResponse>)> {
    let setup = state
        .twofactor_service
        .setup(&current.user)
        .await
        .map_err(error_response)?;

    Ok(Json(setup))
}

/// POST /2fa/enable
pub async fn enable(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CodeRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .twofactor_service
        .enable(&current.user, &request.code)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /2fa/disable
pub async fn disable(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .twofactor_service
        .disable(&current.user)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /2fa/verify
/// Check a live TOTP or consume a backup code for the authenticated user.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CodeRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let valid = state
        .twofactor_service
        .verify(&current.user, &request.code)
        .await
        .map_err(error_response)?;

    if !valid {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("unauthorized", "invalid code")),
        ));
    }

    Ok(Json(VerifyResponse { valid }))
}

/// GET /2fa/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<TwoFactorStatus>, (StatusCode, Json<ErrorResponse>)> {
    let status = state
        .twofactor_service
        .status(&current.user)
        .await
        .map_err(error_response)?;

    Ok(Json(status))
}

/// POST /2fa/verify-session
/// Complete a login held behind a two_factor_required outcome. Authenticates
/// by session token, not bearer token.
pub async fn verify_session(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<MaybeTenant>,
    Json(request): Json<VerifySessionRequest>,
) -> Result<Json<LoginOutcome>, (StatusCode, Json<ErrorResponse>)> {
    let ctx = require_tenant(&tenant)?;

    let outcome = state
        .auth_service
        .complete_two_factor(&ctx.tenant, &request.session_token, &request.code)
        .await
        .map_err(error_response)?;

    Ok(Json(outcome))
}
