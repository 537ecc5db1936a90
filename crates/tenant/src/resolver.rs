use crate::context::TenantContext;
use aegis_database::{DatabaseError, TenantRepository};
use axum::http::{HeaderMap, Uri};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Query parameter names accepted as a tenant identifier, in match order.
const TENANT_QUERY_PARAMS: &[&str] = &["tenant", "tenant_id", "org", "organization"];

const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Debug, Error)]
pub enum ResolveError {
    /// No candidate validated and no default tenant exists. Downstream
    /// operations treat this as its own unauthenticated failure, never as
    /// tenant zero.
    #[error("no tenant resolved for request")]
    NoTenantResolved,

    #[error("tenant store error: {0}")]
    Store(DatabaseError),
}

/// One candidate from the request, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantHint {
    /// An explicit tenant id (path, query, or header)
    Id(Uuid),
    /// An opaque lookup key (header value that is not a UUID)
    Key(String),
    /// The full request host
    Domain(String),
    /// The first host label
    Subdomain(String),
}

/// Pure candidate extraction. Priority: URL path, query parameter, explicit
/// header, host mapping. The default-tenant fallback lives in `resolve`.
pub fn candidates(uri: &Uri, headers: &HeaderMap) -> Vec<TenantHint> {
    let mut hints = Vec::new();

    // 1. Tenant embedded in the URL path: /tenant/{id}/...
    let mut segments = uri.path().split('/').filter(|s| !s.is_empty());
    if segments.next() == Some("tenant") {
        if let Some(raw) = segments.next() {
            match Uuid::parse_str(raw) {
                Ok(id) => hints.push(TenantHint::Id(id)),
                Err(_) => hints.push(TenantHint::Key(raw.to_string())),
            }
        }
    }

    // 2. Query parameter, several accepted names
    if let Some(query) = uri.query() {
        for name in TENANT_QUERY_PARAMS {
            if let Some(value) = query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
            {
                if !value.is_empty() {
                    match Uuid::parse_str(value) {
                        Ok(id) => hints.push(TenantHint::Id(id)),
                        Err(_) => hints.push(TenantHint::Key(value.to_string())),
                    }
                    break;
                }
            }
        }
    }

    // 3. Explicit tenant header, either an id or a lookup key
    if let Some(value) = headers.get(TENANT_HEADER).and_then(|v| v.to_str().ok()) {
        if !value.is_empty() {
            match Uuid::parse_str(value) {
                Ok(id) => hints.push(TenantHint::Id(id)),
                Err(_) => hints.push(TenantHint::Key(value.to_string())),
            }
        }
    }

    // 4. Host / subdomain mapping
    if let Some(host) = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
    {
        let host = host.split(':').next().unwrap_or(host);
        if !host.is_empty() {
            hints.push(TenantHint::Domain(host.to_string()));

            let labels: Vec<&str> = host.split('.').collect();
            if labels.len() >= 3 && labels[0] != "www" {
                hints.push(TenantHint::Subdomain(labels[0].to_string()));
            }
        }
    }

    hints
}

#[derive(Clone)]
pub struct TenantResolver {
    tenants: TenantRepository,
}

impl TenantResolver {
    pub fn new(tenants: TenantRepository) -> Self {
        Self { tenants }
    }

    /// Walk the candidate chain, validating each against the store; first
    /// validated candidate wins. Falls back to the default tenant, then
    /// fails with `NoTenantResolved`.
    pub async fn resolve(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<TenantContext, ResolveError> {
        for hint in candidates(uri, headers) {
            match self.lookup(&hint).await {
                Ok(tenant) => {
                    debug!(tenant_id = %tenant.id, hint = ?hint, "Resolved tenant");
                    return Ok(TenantContext::new(tenant));
                }
                Err(DatabaseError::NotFound(_)) => continue,
                Err(e) => return Err(ResolveError::Store(e)),
            }
        }

        match self.tenants.find_default().await {
            Ok(Some(tenant)) => {
                debug!(tenant_id = %tenant.id, "Resolved default tenant");
                Ok(TenantContext::new(tenant))
            }
            Ok(None) => Err(ResolveError::NoTenantResolved),
            Err(e) => Err(ResolveError::Store(e)),
        }
    }

    async fn lookup(&self, hint: &TenantHint) -> Result<aegis_models::Tenant, DatabaseError> {
        match hint {
            TenantHint::Id(id) => self.tenants.find_active(*id).await,
            TenantHint::Key(key) => match self.tenants.find_by_subdomain(key).await {
                Ok(tenant) => Ok(tenant),
                Err(DatabaseError::NotFound(_)) => self.tenants.find_by_domain(key).await,
                Err(e) => Err(e),
            },
            TenantHint::Domain(domain) => self.tenants.find_by_domain(domain).await,
            TenantHint::Subdomain(subdomain) => self.tenants.find_by_subdomain(subdomain).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_path_beats_header() {
        let path_id = Uuid::new_v4();
        let header_id = Uuid::new_v4();
        let uri: Uri = format!("/tenant/{}/oauth/token", path_id).parse().unwrap();
        let headers = headers(&[("x-tenant-id", &header_id.to_string())]);

        let hints = candidates(&uri, &headers);
        assert_eq!(hints[0], TenantHint::Id(path_id));
        assert_eq!(hints[1], TenantHint::Id(header_id));
    }

    #[test]
    fn test_query_beats_header_but_not_path() {
        let path_id = Uuid::new_v4();
        let query_id = Uuid::new_v4();
        let header_id = Uuid::new_v4();
        let uri: Uri = format!("/tenant/{}/login?tenant_id={}", path_id, query_id)
            .parse()
            .unwrap();
        let headers = headers(&[("x-tenant-id", &header_id.to_string())]);

        let hints = candidates(&uri, &headers);
        assert_eq!(
            hints,
            vec![
                TenantHint::Id(path_id),
                TenantHint::Id(query_id),
                TenantHint::Id(header_id),
            ]
        );
    }

    #[test]
    fn test_accepted_query_parameter_names() {
        for name in ["tenant", "tenant_id", "org", "organization"] {
            let id = Uuid::new_v4();
            let uri: Uri = format!("/login?{}={}", name, id).parse().unwrap();
            let hints = candidates(&uri, &HeaderMap::new());
            assert_eq!(hints, vec![TenantHint::Id(id)], "param {}", name);
        }
    }

    #[test]
    fn test_header_accepts_opaque_key() {
        let uri: Uri = "/login".parse().unwrap();
        let headers = headers(&[("x-tenant-id", "acme")]);

        let hints = candidates(&uri, &headers);
        assert_eq!(hints, vec![TenantHint::Key("acme".to_string())]);
    }

    #[test]
    fn test_host_yields_domain_then_subdomain() {
        let uri: Uri = "/login".parse().unwrap();
        let headers = headers(&[("host", "acme.id.example.com:8443")]);

        let hints = candidates(&uri, &headers);
        assert_eq!(
            hints,
            vec![
                TenantHint::Domain("acme.id.example.com".to_string()),
                TenantHint::Subdomain("acme".to_string()),
            ]
        );
    }

    #[test]
    fn test_bare_host_has_no_subdomain_candidate() {
        let uri: Uri = "/login".parse().unwrap();
        let headers = headers(&[("host", "localhost:8080")]);

        let hints = candidates(&uri, &headers);
        assert_eq!(hints, vec![TenantHint::Domain("localhost".to_string())]);
    }

    #[test]
    fn test_no_candidates() {
        let uri: Uri = "/oauth/token".parse().unwrap();
        assert!(candidates(&uri, &HeaderMap::new()).is_empty());
    }
}
