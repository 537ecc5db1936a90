//! Space-delimited scope string handling.
//!
//! Scopes are always compared token-by-token; substring matching would let
//! `read` match inside `unread`.

/// Tokens of a scope string.
pub fn scope_tokens(scope: &str) -> impl Iterator<Item = &str> {
    scope.split_whitespace()
}

/// Whether `scope` contains `name` as a whole token.
pub fn has_scope(scope: &str, name: &str) -> bool {
    scope_tokens(scope).any(|token| token == name)
}

/// Intersect a requested scope string with the scopes an account holds,
/// preserving request order.
pub fn intersect(requested: &str, granted: &[String]) -> Vec<String> {
    scope_tokens(requested)
        .filter(|token| granted.iter().any(|g| g == token))
        .map(String::from)
        .collect()
}

pub fn join(scopes: &[String]) -> String {
    scopes.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_scope_whole_tokens_only() {
        assert!(has_scope("openid profile read", "read"));
        assert!(!has_scope("openid profile unread", "read"));
        assert!(!has_scope("readonly", "read"));
        assert!(!has_scope("preread", "read"));
    }

    #[test]
    fn test_has_scope_handles_extra_whitespace() {
        assert!(has_scope("  openid   email ", "email"));
        assert!(!has_scope("", "email"));
    }

    #[test]
    fn test_intersect() {
        let granted = vec![
            "openid".to_string(),
            "email".to_string(),
            "reports:read".to_string(),
        ];
        assert_eq!(
            intersect("openid reports:read admin", &granted),
            vec!["openid".to_string(), "reports:read".to_string()]
        );
        assert!(intersect("admin", &granted).is_empty());
    }
}
