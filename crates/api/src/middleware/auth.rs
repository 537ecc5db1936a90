use crate::handlers::auth::ErrorResponse;
use crate::AppState;
use aegis_models::User;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated subject attached to protected requests.
#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
    pub scope: Option<String>,
}

/// Extract the bearer token from the Authorization header
pub fn extract_bearer_token(
    headers: &HeaderMap,
) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "unauthorized",
                    "Authorization header is required",
                )),
            )
        })?
        .to_str()
        .map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "unauthorized",
                    "Invalid Authorization header format",
                )),
            )
        })?;

    if !auth_header.starts_with("Bearer ") {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "unauthorized",
                "Authorization header must use Bearer scheme",
            )),
        ));
    }

    Ok(auth_header[7..].to_string())
}

/// Validate the presented access token (signature, expiry, and the persisted
/// record's revocation state) and load the subject.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(req.headers()) {
        Ok(token) => token,
        Err(rejection) => return rejection.into_response(),
    };

    let claims = match state.oauth2_service.validate_access_token(&token).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("Access token rejected: {}", e);
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "Invalid or expired token")),
            )
                .into_response();
        }
    };

    let (tenant_id, user_id) = match (
        Uuid::parse_str(&claims.tenant_id),
        Uuid::parse_str(&claims.sub),
    ) {
        (Ok(tenant_id), Ok(user_id)) => (tenant_id, user_id),
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "Invalid token subject")),
            )
                .into_response();
        }
    };

    let user = match sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE tenant_id = $1 AND id = $2 AND is_active = true",
    )
    .bind(tenant_id)
    .bind(user_id)
    .fetch_optional(state.db.pool())
    .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(user_id = %user_id, "Token subject unknown or inactive");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "Invalid or expired token")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("User lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("server_error", "Internal error")),
            )
                .into_response();
        }
    };

    req.extensions_mut().insert(CurrentUser {
        user,
        scope: claims.scope,
    });

    next.run(req).await
}
