use crate::handlers::auth::ErrorResponse;
use crate::AppState;
use aegis_auth::PasswordHasher;
use aegis_database::{TenantRepository, UserRepository};
use aegis_models::{NewTenant, NewUser};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub token: String,
    pub tenant_name: String,
    pub admin_email: String,
    pub admin_password: String,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub tenant_id: Uuid,
    pub admin_user_id: Uuid,
}

/// POST /setup
/// One-shot first-boot bootstrap: consumes the process-wide setup token and
/// provisions the default tenant with its admin account.
pub async fn complete_setup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<SetupResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !state.setup.consume(&request.token) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "unauthorized",
                "invalid or expired setup token",
            )),
        ));
    }

    let tenants = TenantRepository::new(state.db.pool().clone());
    let users = UserRepository::new(state.db.pool().clone());

    let tenant = tenants
        .create(&NewTenant {
            name: request.tenant_name,
            domain: None,
            subdomain: None,
            is_default: true,
            settings: None,
        })
        .await
        .map_err(|e| {
            tracing::error!("Setup tenant creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("server_error", "internal error")),
            )
        })?;

    let password_hash = PasswordHasher::hash(&request.admin_password).map_err(|e| {
        tracing::error!("Setup password hashing failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("server_error", "internal error")),
        )
    })?;

    let admin = users
        .create(
            &NewUser {
                tenant_id: tenant.id,
                email: request.admin_email,
                username: Some("admin".to_string()),
                password: None,
                first_name: None,
                last_name: None,
                groups: vec!["admins".to_string()],
                scopes: vec![
                    "openid".to_string(),
                    "email".to_string(),
                    "profile".to_string(),
                    "admin".to_string(),
                ],
            },
            Some(&password_hash),
        )
        .await
        .map_err(|e| {
            tracing::error!("Setup admin creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("server_error", "internal error")),
            )
        })?;

    info!(tenant_id = %tenant.id, "Setup complete");

    Ok(Json(SetupResponse {
        tenant_id: tenant.id,
        admin_user_id: admin.id,
    }))
}
