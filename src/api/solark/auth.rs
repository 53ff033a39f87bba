use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;

/// Which login handshake to run against `/rest/account/login`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum AuthMode {
    /// Try `Strict` first, fall back to `Legacy` on credential rejections.
    #[default]
    Auto,

    /// Structured login with `grant_type=password`.
    Strict,

    /// Loosely-typed `username`/`pwd` login accepted by older portals.
    Legacy,
}

impl AuthMode {
    pub(super) const fn strategies(self) -> &'static [LoginStrategy] {
        match self {
            Self::Auto => &[LoginStrategy::Strict, LoginStrategy::Legacy],
            Self::Strict => &[LoginStrategy::Strict],
            Self::Legacy => &[LoginStrategy::Legacy],
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) enum LoginStrategy {
    Strict,
    Legacy,
}

impl LoginStrategy {
    pub(super) const fn name(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Legacy => "legacy",
        }
    }

    pub(super) const fn request<'a>(self, email: &'a str, password: &'a str) -> LoginRequest<'a> {
        match self {
            Self::Strict => LoginRequest::Strict { email, password, grant_type: "password" },
            Self::Legacy => LoginRequest::Legacy { username: email, pwd: password },
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub(super) enum LoginRequest<'a> {
    Strict {
        email: &'a str,
        password: &'a str,
        grant_type: &'static str,
    },

    Legacy {
        username: &'a str,
        pwd: &'a str,
    },
}

/// A bearer token and its computed lifetime, owned by the client and replaced
/// wholesale on every successful login.
#[derive(Clone, Debug)]
pub(super) struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Server-declared lifetime minus a safety margin, or half an hour when
    /// the server stays silent about it.
    pub fn new(token: String, expires_in: Option<i64>) -> Self {
        let lifetime = expires_in.map_or_else(
            || TimeDelta::minutes(30),
            |seconds| TimeDelta::seconds(seconds) - TimeDelta::seconds(60),
        );
        Self { token, expires_at: Utc::now() + lifetime }
    }

    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// The token field moved around across portal versions; the first shape that
/// matches wins.
pub(super) fn extract_token(body: &Value) -> Option<&str> {
    ["/data/token", "/data/access_token", "/token", "/access_token"]
        .iter()
        .find_map(|path| body.pointer(path))
        .and_then(Value::as_str)
}

pub(super) fn extract_expires_in(body: &Value) -> Option<i64> {
    ["/data/expires_in", "/expires_in"].iter().find_map(|path| body.pointer(path)).and_then(
        |value| match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_extract_token_shapes() {
        assert_eq!(extract_token(&json!({"data": {"token": "a"}})), Some("a"));
        assert_eq!(extract_token(&json!({"data": {"access_token": "b"}})), Some("b"));
        assert_eq!(extract_token(&json!({"token": "c"})), Some("c"));
        assert_eq!(extract_token(&json!({"access_token": "d"})), Some("d"));
        assert_eq!(extract_token(&json!({"data": {}})), None);
        assert_eq!(extract_token(&json!({"token": 42})), None);
    }

    #[test]
    fn test_extract_token_prefers_nested_shape() {
        let body = json!({"data": {"token": "nested"}, "token": "flat"});
        assert_eq!(extract_token(&body), Some("nested"));
    }

    #[test]
    fn test_extract_expires_in_tolerates_strings() {
        assert_eq!(extract_expires_in(&json!({"data": {"expires_in": 3600}})), Some(3600));
        assert_eq!(extract_expires_in(&json!({"expires_in": "7200"})), Some(7200));
        assert_eq!(extract_expires_in(&json!({"expires_in": "soon"})), None);
        assert_eq!(extract_expires_in(&json!({})), None);
    }

    #[test]
    fn test_session_lifetime_margin() {
        let session = Session::new("token".to_owned(), Some(3600));
        let lifetime = session.expires_at - Utc::now();
        assert!(lifetime <= TimeDelta::seconds(3540));
        assert!(lifetime > TimeDelta::seconds(3530));
        assert!(session.is_valid());
    }

    #[test]
    fn test_session_default_lifetime() {
        let session = Session::new("token".to_owned(), None);
        let lifetime = session.expires_at - Utc::now();
        assert!(lifetime <= TimeDelta::minutes(30));
        assert!(lifetime > TimeDelta::minutes(29));
    }

    #[test]
    fn test_session_with_tiny_lifetime_is_already_stale() {
        let session = Session::new("token".to_owned(), Some(30));
        assert!(!session.is_valid());
    }
}
