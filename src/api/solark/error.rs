use reqwest::StatusCode;

/// Sol-Ark Cloud failure taxonomy.
///
/// [`Error::Auth`] is recoverable by re-authenticating once and fatal if that
/// also fails; everything else is a failed cycle that the next scheduled poll
/// simply retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad credentials, or a token that expired or was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Timeout, DNS/TCP failure, or a server-side 5xx.
    #[error("connection error: {0}")]
    Connection(String),

    /// HTTP 429.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Malformed response, unexpected shape, or a non-zero application code.
    #[error("API error: {0}")]
    Api(String),
}

impl Error {
    /// Whether the next poll cycle may simply retry, as opposed to the
    /// credentials needing attention.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::RateLimit(_) | Self::Api(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Api(format!("invalid response: {error}"))
        } else {
            // Timeouts, DNS, TCP, TLS: all environment-level.
            Self::Connection(error.to_string())
        }
    }
}

/// Maps a non-200 login status. 401 and 403 are credential-level here,
/// unlike on the data endpoints.
pub(super) fn login_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => {
            Error::Auth("invalid credentials (401), verify the email and password".to_owned())
        }
        StatusCode::FORBIDDEN => {
            Error::Auth("access forbidden (403), the account may be locked or disabled".to_owned())
        }
        StatusCode::TOO_MANY_REQUESTS => {
            Error::RateLimit("rate limit exceeded (429), wait before trying again".to_owned())
        }
        status if status.is_server_error() => {
            Error::Connection(format!("Sol-Ark server error ({status}), try again later"))
        }
        status => Error::Api(format!("unexpected login status {status}: {}", snippet(body))),
    }
}

/// Maps a non-200, non-401 status on a data endpoint.
pub(super) fn data_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::BAD_REQUEST => {
            Error::Api("bad request (400), the plant id format may be invalid".to_owned())
        }
        StatusCode::FORBIDDEN => {
            Error::Api("access forbidden (403), no permission to view this plant".to_owned())
        }
        StatusCode::NOT_FOUND => {
            Error::Api("plant not found (404), verify the plant id".to_owned())
        }
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit(
            "rate limit exceeded (429), consider increasing the poll interval".to_owned(),
        ),
        status if status.is_server_error() => {
            Error::Connection(format!("Sol-Ark server error ({status}), try again later"))
        }
        status => Error::Api(format!("unexpected status {status}: {}", snippet(body))),
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
