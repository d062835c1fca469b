use super::{scroll_by, settle, SelectionRule, SUPPRESS_POPUPS};
use crate::error::Result;
use crate::models::SiteId;
use crate::traits::{BrowsingSession, LoadCondition, Readiness, RenderedPage, SiteAdapter, WaitPolicy};
use std::time::Duration;
use tracing::debug;

const SCROLL_PIXELS: u32 = 400;
const SETTLE: Duration = Duration::from_millis(1500);

/// ErosScans (MangaReader WordPress theme). Reader images live in `#readerarea`
/// and some of them only get a real `src` once the reader is scrolled.
pub struct ErosAdapter {
    rule: SelectionRule,
}

impl ErosAdapter {
    pub fn new() -> Self {
        Self {
            rule: SelectionRule {
                selector: "#readerarea img.ts-main-image",
                attributes: &["src", "data-src"],
                allow: &[],
                deny: &["logo", "banner"],
                require_image_extension: false,
            },
        }
    }
}

impl Default for ErosAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SiteAdapter for ErosAdapter {
    fn site(&self) -> SiteId {
        SiteId::Eros
    }

    fn hosts(&self) -> &'static [&'static str] {
        &["erosscans.com", "erosscans.xyz", "eros-moon.xyz"]
    }

    fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            load: LoadCondition::DomContentLoaded,
            readiness: Readiness::Immediate,
        }
    }

    fn fallback_extension(&self) -> &'static str {
        ".jpg"
    }

    fn init_scripts(&self) -> &'static [&'static str] {
        &[SUPPRESS_POPUPS]
    }

    async fn pre_step(&self, session: &dyn BrowsingSession) -> Result<()> {
        debug!("[EROS] Scrolling reader by {}px", SCROLL_PIXELS);
        scroll_by(session, SCROLL_PIXELS).await?;
        settle(SETTLE).await;
        Ok(())
    }

    fn select_image_urls(&self, page: &RenderedPage) -> Vec<String> {
        self.rule.apply(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::page;

    #[test]
    fn test_selects_reader_images_only() {
        let page = page(
            "https://erosscans.com/some-title-chapter-12/",
            r#"<header><img class="ts-main-image" src="https://erosscans.com/header.jpg"></header>
               <div id="readerarea">
                 <img class="ts-main-image" src="https://cdn.erosscans.com/ch12/01.webp">
                 <img class="ts-main-image" src="https://cdn.erosscans.com/ch12/erosscans-banner.jpg">
                 <img class="other" src="https://cdn.erosscans.com/ch12/ad.jpg">
                 <img class="ts-main-image" src="data:image/svg+xml,%3Csvg%3E" data-src="https://cdn.erosscans.com/ch12/02.webp">
               </div>"#,
        );

        assert_eq!(
            ErosAdapter::new().select_image_urls(&page),
            vec![
                "https://cdn.erosscans.com/ch12/01.webp",
                "https://cdn.erosscans.com/ch12/02.webp",
            ]
        );
    }

    #[test]
    fn test_policy() {
        let adapter = ErosAdapter::new();
        assert_eq!(adapter.wait_policy().load, LoadCondition::DomContentLoaded);
        assert_eq!(adapter.fallback_extension(), ".jpg");
        assert_eq!(adapter.init_scripts().len(), 1);
        assert!(!adapter.supports_chapter_range());
    }
}
