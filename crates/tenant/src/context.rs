use aegis_models::Tenant;
use uuid::Uuid;

/// Resolved tenant carried through a request's extensions.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub tenant: Tenant,
}

impl TenantContext {
    pub fn new(tenant: Tenant) -> Self {
        Self {
            tenant_id: tenant.id,
            tenant,
        }
    }
}
