use super::SelectionRule;
use crate::models::SiteId;
use crate::traits::{LoadCondition, Readiness, RenderedPage, SiteAdapter, WaitPolicy};
use std::time::Duration;

/// AsuraScans renders its reader client-side; the page is ready once network
/// activity settles and at least one `img` exists.
pub struct AsuraAdapter {
    rule: SelectionRule,
}

impl AsuraAdapter {
    pub fn new() -> Self {
        Self {
            rule: SelectionRule {
                selector: "img",
                attributes: &["src"],
                allow: &[],
                deny: &["logo", "banner"],
                require_image_extension: true,
            },
        }
    }
}

impl Default for AsuraAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SiteAdapter for AsuraAdapter {
    fn site(&self) -> SiteId {
        SiteId::Asura
    }

    fn hosts(&self) -> &'static [&'static str] {
        &["asuracomic.net", "asurascans.com"]
    }

    fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            load: LoadCondition::NetworkIdle,
            readiness: Readiness::Selector {
                css: "img",
                timeout: Duration::from_secs(10),
            },
        }
    }

    fn fallback_extension(&self) -> &'static str {
        ".webp"
    }

    fn select_image_urls(&self, page: &RenderedPage) -> Vec<String> {
        self.rule.apply(page)
    }
}
