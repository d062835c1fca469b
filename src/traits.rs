use crate::error::Result;
use crate::models::SiteId;
use std::time::Duration;
use url::Url;

/// Snapshot of a rendered page: the serialized DOM and the URL it was loaded from.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: Url,
    pub html: String,
}

/// Lifecycle event a navigation waits for before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCondition {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

/// Extra readiness check applied after navigation returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Immediate,
    Delay(Duration),
    Selector { css: &'static str, timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub load: LoadCondition,
    pub readiness: Readiness,
}

/// Site-specific selection and interaction rules
#[async_trait::async_trait]
pub trait SiteAdapter: Send + Sync {
    fn site(&self) -> SiteId;

    /// Hostnames (matched by suffix) this adapter handles.
    fn hosts(&self) -> &'static [&'static str];

    fn wait_policy(&self) -> WaitPolicy;

    /// Extension (with leading dot) used when a URL carries none.
    fn fallback_extension(&self) -> &'static str;

    /// Scripts installed before navigation, evaluated on every new document.
    fn init_scripts(&self) -> &'static [&'static str] {
        &[]
    }

    fn supports_chapter_range(&self) -> bool {
        false
    }

    /// Interaction run after the page is ready and before selection (scrolling, popups).
    async fn pre_step(&self, _session: &dyn BrowsingSession) -> Result<()> {
        Ok(())
    }

    /// Ordered, de-duplicated absolute image URLs in reading order.
    fn select_image_urls(&self, page: &RenderedPage) -> Vec<String>;
}

/// Launches isolated browsing sessions
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowsingSession>>;
}

/// One isolated browsing context. Callers must finish with [`BrowsingSession::close`].
#[async_trait::async_trait]
pub trait BrowsingSession: Send + Sync {
    async fn add_init_script(&self, script: &str) -> Result<()>;

    async fn navigate(&self, url: &Url, load: LoadCondition) -> Result<()>;

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<()>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn content(&self) -> Result<RenderedPage>;

    /// Fetches a resource with this session's cookies and referrer.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    async fn close(self: Box<Self>) -> Result<()>;
}
