//! Session cookie carrying the identity token

use std::time::Duration;

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

use crate::error::{ApiError, ApiResult};

/// Name of the cookie holding the identity token
pub const SESSION_COOKIE_NAME: &str = "token";

/// Attributes for the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub domain: Option<String>,
    pub max_age: Duration,
    /// `Secure; SameSite=None` when true, `SameSite=Lax` otherwise
    pub secure: bool,
}

impl SessionCookie {
    pub fn new(domain: Option<String>, max_age: Duration, secure: bool) -> Self {
        Self {
            name: SESSION_COOKIE_NAME,
            domain,
            max_age,
            secure,
        }
    }

    /// `Set-Cookie` value storing `token`
    pub fn set(&self, token: &str) -> ApiResult<HeaderValue> {
        self.render(token, self.max_age.as_secs())
    }

    /// `Set-Cookie` value that expires the cookie immediately
    pub fn clear(&self) -> ApiResult<HeaderValue> {
        self.render("", 0)
    }

    fn render(&self, value: &str, max_age_secs: u64) -> ApiResult<HeaderValue> {
        let mut cookie = format!("{}={}; Path=/; HttpOnly", self.name, value);
        if self.secure {
            cookie.push_str("; Secure; SameSite=None");
        } else {
            cookie.push_str("; SameSite=Lax");
        }
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie.push_str(&format!("; Max-Age={}", max_age_secs));

        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))
    }
}

/// Value of cookie `name` from the request's `Cookie` headers
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = SessionCookie::new(
            Some("trainhub.app".to_string()),
            Duration::from_secs(7200),
            true,
        );
        let value = cookie.set("abc.def.ghi").unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "token=abc.def.ghi; Path=/; HttpOnly; Secure; SameSite=None; Domain=trainhub.app; Max-Age=7200"
        );
    }

    #[test]
    fn test_clear_cookie() {
        let cookie = SessionCookie::new(None, Duration::from_secs(7200), false);
        let value = cookie.clear().unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
    }

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; token=xyz"));
        headers.append(COOKIE, HeaderValue::from_static("other=1"));

        assert_eq!(read_cookie(&headers, "token"), Some("xyz"));
        assert_eq!(read_cookie(&headers, "other"), Some("1"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_read_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("token="));
        assert_eq!(read_cookie(&headers, "token"), None);
    }
}
