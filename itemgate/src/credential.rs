//! Bearer credential extraction from an `Authorization` header value

use crate::jwt::JwtRef;

const BEARER_PREFIX: &str = "bearer ";

/// Extracts the token from a `Bearer <token>` header value
///
/// The scheme is matched case-insensitively and whitespace around the token
/// is ignored. Returns `None` when the header is absent, uses another scheme,
/// or carries no token.
///
/// ```
/// use itemgate::credential::extract_bearer;
///
/// assert!(extract_bearer(Some("BEARER abc.def.ghi")).is_some());
/// assert!(extract_bearer(Some("Basic dXNlcjpwYXNz")).is_none());
/// assert!(extract_bearer(None).is_none());
/// ```
#[must_use]
pub fn extract_bearer(header: Option<&str>) -> Option<&JwtRef> {
    let header = header?;
    let scheme = header.get(..BEARER_PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }

    let token = header[BEARER_PREFIX.len()..].trim();
    if token.is_empty() {
        return None;
    }

    Some(JwtRef::from_str(token))
}
