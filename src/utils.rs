use crate::error::Result;
use reqwest::header::{COOKIE, REFERER};
use reqwest::Client;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "MangaGrab/1.0";

/// Cookie name/value pairs captured from a browsing session.
pub type SessionCookies = Vec<(String, String)>;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()?;

        Ok(Self { client })
    }

    /// GETs `url` as the page at `referer` would, with the session's cookies attached.
    pub async fn get_bytes(
        &self,
        url: &str,
        referer: Option<&str>,
        cookies: &[(String, String)],
    ) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);

        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        if let Some(cookie) = cookie_header(cookies) {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

pub fn cookie_header(cookies: &[(String, String)]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }

    Some(
        cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}
