use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrabError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Browser protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Site not supported: {0}")]
    SiteNotSupported(String),
}

impl GrabError {
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn site_not_supported(site: impl Into<String>) -> Self {
        Self::SiteNotSupported(site.into())
    }

    /// Errors raised before any browser resource is acquired.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::SiteNotSupported(_))
    }
}

pub type Result<T> = std::result::Result<T, GrabError>;
