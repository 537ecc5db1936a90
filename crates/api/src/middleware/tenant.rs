use crate::AppState;
use aegis_tenant::{ResolveError, TenantContext};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// The resolved tenant, if any. A request with no resolvable tenant still
/// proceeds; operations that need one fail distinctly instead of assuming a
/// default.
#[derive(Clone)]
pub struct MaybeTenant(pub Option<TenantContext>);

pub async fn resolve_tenant(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match state.resolver.resolve(req.uri(), req.headers()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(MaybeTenant(Some(ctx)));
        }
        Err(ResolveError::NoTenantResolved) => {
            req.extensions_mut().insert(MaybeTenant(None));
        }
        Err(ResolveError::Store(e)) => {
            tracing::error!("Tenant resolution store error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(aegis_models::TokenError::server_error(
                    "tenant resolution failed",
                )),
            )
                .into_response();
        }
    }

    next.run(req).await
}
