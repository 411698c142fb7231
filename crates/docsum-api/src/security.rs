//! Shared-secret checks for internal endpoints.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

pub const WORKER_SECRET_HEADER: &str = "x-worker-secret";

/// Compare secrets without short-circuiting on the first differing byte.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The secret presented by a scheduler: `x-worker-secret`, else a bearer token.
pub fn presented_worker_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(secret) = headers
        .get(WORKER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(secret.trim());
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Whether a request may run the summary worker.
///
/// Always true when no secret is configured.
pub fn is_worker_authorized(configured: Option<&str>, headers: &HeaderMap) -> bool {
    match configured {
        None => true,
        Some(expected) => presented_worker_secret(headers)
            .map(|provided| secrets_match(expected, provided))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("abc", "abcd"));
    }

    #[test]
    fn test_worker_authorization() {
        let mut headers = HeaderMap::new();
        assert!(is_worker_authorized(None, &headers));
        assert!(!is_worker_authorized(Some("s"), &headers));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s"));
        assert!(is_worker_authorized(Some("s"), &headers));

        headers.insert(WORKER_SECRET_HEADER, HeaderValue::from_static("wrong"));
        assert!(!is_worker_authorized(Some("s"), &headers));
    }
}
