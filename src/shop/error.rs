use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    /// The session cookies were rejected or re-auth did not yield a token.
    #[error("Riot session rejected: {0}")]
    Unauthorized(String),

    #[error("Rate limited by Riot, try again later")]
    RateLimited,

    #[error("Riot services unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("All storefront endpoints failed")]
    StorefrontFailed,

    #[error("Version fetch failed: {0}")]
    VersionFetchFailed(String),
}

impl ShopError {
    /// Classify an upstream status. `None` for statuses without a dedicated
    /// variant.
    pub(super) fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Some(Self::Unauthorized(format!("HTTP {}", status)))
            }
            StatusCode::TOO_MANY_REQUESTS => Some(Self::RateLimited),
            s if s.is_server_error() => Some(Self::Unavailable(format!("HTTP {}", s))),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::Unavailable(_) => "unavailable",
            Self::Http(_) => "http",
            Self::ParseError(_) => "parse",
            Self::StorefrontFailed => "storefront_failed",
            Self::VersionFetchFailed(_) => "version_fetch_failed",
        }
    }
}

impl From<reqwest::Error> for ShopError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(classified) = e.status().and_then(Self::from_status) {
            return classified;
        }
        if e.is_connect() || e.is_timeout() {
            Self::Unavailable(e.to_string())
        } else if e.is_decode() {
            Self::ParseError(e.to_string())
        } else {
            Self::Http(e)
        }
    }
}
