//! Login domain scoping.
//!
//! Interactive logins can be scoped to a user domain so the identity
//! provider shows only that domain's login. The domain comes from the
//! caveat condition or, failing that, from a `domain` cookie.

use url::form_urlencoded;

/// Pick the login domain. A condition domain always wins over the cookie.
pub fn resolve_domain(condition_domain: Option<&str>, cookie_domain: Option<&str>) -> Option<String> {
    condition_domain.or(cookie_domain).map(str::to_string)
}

/// Decode and check a `domain` cookie value.
///
/// The value may be percent-escaped. A literal `+` is kept as is (cookies
/// are not form-encoded). Values that fail the check are ignored rather
/// than rejected: a stale cookie must not break discharge.
pub fn cookie_domain(raw: &str) -> Option<String> {
    let protected = raw.replace('+', "%2B");
    let encoded = format!("d={protected}");
    let (_, value) = form_urlencoded::parse(encoded.as_bytes()).next()?;
    is_valid_cookie_domain(&value).then(|| value.into_owned())
}

/// Cookie domains are checked more leniently than condition domains:
/// `+` is allowed, a trailing hyphen is not.
fn is_valid_cookie_domain(domain: &str) -> bool {
    !domain.is_empty()
        && !domain.ends_with('-')
        && domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'+'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_beats_cookie() {
        assert_eq!(
            resolve_domain(Some("test-domain"), Some("cookie-domain")).as_deref(),
            Some("test-domain")
        );
        assert_eq!(
            resolve_domain(None, Some("cookie-domain")).as_deref(),
            Some("cookie-domain")
        );
        assert_eq!(resolve_domain(Some("test-domain"), None).as_deref(), Some("test-domain"));
        assert_eq!(resolve_domain(None, None), None);
    }

    #[test]
    fn cookie_values() {
        assert_eq!(cookie_domain("test2").as_deref(), Some("test2"));
        assert_eq!(cookie_domain("test+2").as_deref(), Some("test+2"));
        assert_eq!(cookie_domain("test%2B2").as_deref(), Some("test+2"));
        assert_eq!(cookie_domain("test2-"), None);
        assert_eq!(cookie_domain(""), None);
        assert_eq!(cookie_domain("a%20b"), None);
    }
}
