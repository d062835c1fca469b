use super::{scroll_to_bottom, settle, SelectionRule};
use crate::error::Result;
use crate::models::SiteId;
use crate::traits::{BrowsingSession, LoadCondition, Readiness, RenderedPage, SiteAdapter, WaitPolicy};
use std::time::Duration;
use tracing::debug;

const SETTLE: Duration = Duration::from_millis(1000);

/// Sites on the Madara (WP-Manga) theme, Thunderscans among them. Images are
/// lazy-loaded, so the real URL usually sits in `data-src` until scrolled into view.
pub struct MadaraAdapter {
    rule: SelectionRule,
}

impl MadaraAdapter {
    pub fn new() -> Self {
        Self {
            rule: SelectionRule {
                selector: ".reading-content img, .page-break img, img.wp-manga-chapter-img",
                attributes: &["data-src", "data-lazy-src", "src"],
                allow: &["wp-content"],
                deny: &["avatar", "logo", "icon"],
                require_image_extension: false,
            },
        }
    }
}

impl Default for MadaraAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SiteAdapter for MadaraAdapter {
    fn site(&self) -> SiteId {
        SiteId::Madara
    }

    // Generic theme: no host can be claimed for detection.
    fn hosts(&self) -> &'static [&'static str] {
        &[]
    }

    fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            load: LoadCondition::Load,
            readiness: Readiness::Selector {
                css: ".reading-content",
                timeout: Duration::from_secs(15),
            },
        }
    }

    fn fallback_extension(&self) -> &'static str {
        ".jpg"
    }

    async fn pre_step(&self, session: &dyn BrowsingSession) -> Result<()> {
        debug!("[MADARA] Scrolling to bottom to trigger lazy loading");
        scroll_to_bottom(session).await?;
        settle(SETTLE).await;
        Ok(())
    }

    fn select_image_urls(&self, page: &RenderedPage) -> Vec<String> {
        self.rule.apply(page)
    }
}
