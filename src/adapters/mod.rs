//! Site adapters.
//!
//! Each supported site gets its own adapter holding a declarative [`SelectionRule`]
//! plus whatever interaction the site needs before its images are in the DOM.

pub mod asura;
pub mod eros;
pub mod madara;

pub use asura::AsuraAdapter;
pub use eros::ErosAdapter;
pub use madara::MadaraAdapter;

use crate::error::Result;
use crate::traits::{BrowsingSession, RenderedPage};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Which elements hold chapter images and which of their URLs to keep.
#[derive(Debug, Clone)]
pub struct SelectionRule {
    /// CSS selector for candidate elements, in document order.
    pub selector: &'static str,
    /// Attributes read in order; the first usable URL wins.
    pub attributes: &'static [&'static str],
    /// When non-empty, a URL must contain at least one of these substrings.
    pub allow: &'static [&'static str],
    /// Case-insensitive substrings that disqualify a URL's file name.
    pub deny: &'static [&'static str],
    /// Only keep URLs whose path ends in a known image extension.
    pub require_image_extension: bool,
}

impl SelectionRule {
    pub fn apply(&self, page: &RenderedPage) -> Vec<String> {
        let selector = match Selector::parse(self.selector) {
            Ok(selector) => selector,
            Err(e) => {
                warn!("Invalid selector '{}': {:?}", self.selector, e);
                return Vec::new();
            }
        };

        let document = Html::parse_document(&page.html);
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for element in document.select(&selector) {
            let candidate = self
                .attributes
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .find_map(|raw| resolve(&page.url, raw));

            let Some(url) = candidate else { continue };

            if !self.accepts(&url) {
                debug!("Excluded candidate: {}", url);
                continue;
            }

            let url = String::from(url);
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }

        urls
    }

    fn accepts(&self, url: &Url) -> bool {
        let as_str = url.as_str();
        if !self.allow.is_empty() && !self.allow.iter().any(|token| as_str.contains(token)) {
            return false;
        }

        let file_name = file_name(url).to_lowercase();
        if self.deny.iter().any(|token| file_name.contains(token)) {
            return false;
        }

        !self.require_image_extension || image_extension_regex().is_match(url.path())
    }
}

/// Resolves an attribute value against the page URL, keeping http(s) URLs only.
fn resolve(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }

    let url = base.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn file_name(url: &Url) -> &str {
    url.path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("")
}

fn image_extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.(jpe?g|png|webp|gif|avif)$").expect("static regex"))
}

pub(crate) async fn scroll_by(session: &dyn BrowsingSession, pixels: u32) -> Result<()> {
    session
        .evaluate(&format!("window.scrollBy(0, {}); true", pixels))
        .await?;
    Ok(())
}

pub(crate) async fn scroll_to_bottom(session: &dyn BrowsingSession) -> Result<()> {
    session
        .evaluate("window.scrollTo(0, document.body.scrollHeight); true")
        .await?;
    Ok(())
}

pub(crate) async fn settle(delay: Duration) {
    tokio::time::sleep(delay).await;
}

/// Neutralises `window.open` and `target=_blank` so sites cannot spawn extra tabs.
pub(crate) const SUPPRESS_POPUPS: &str = r#"
(() => {
    window.open = () => null;
    document.addEventListener('click', (event) => {
        const link = event.target && event.target.closest ? event.target.closest('a[target=_blank]') : null;
        if (link) { link.removeAttribute('target'); }
    }, true);
})();
"#;

#[cfg(test)]
pub(crate) fn page(url: &str, body: &str) -> RenderedPage {
    RenderedPage {
        url: Url::parse(url).unwrap(),
        html: format!("<!doctype html><html><body>{}</body></html>", body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: SelectionRule = SelectionRule {
        selector: "#reader img",
        attributes: &["data-src", "src"],
        allow: &[],
        deny: &["logo"],
        require_image_extension: false,
    };

    #[test]
    fn test_apply_keeps_document_order_and_dedupes() {
        let page = page(
            "https://site.test/chapter/1/",
            r#"<div id="reader">
                <img src="https://cdn.test/c.jpg">
                <img src="https://cdn.test/a.jpg">
                <img src="https://cdn.test/c.jpg">
                <img src="https://cdn.test/b.jpg">
            </div>"#,
        );

        assert_eq!(
            RULE.apply(&page),
            vec![
                "https://cdn.test/c.jpg",
                "https://cdn.test/a.jpg",
                "https://cdn.test/b.jpg",
            ]
        );
    }

    #[test]
    fn test_apply_resolves_relative_and_skips_placeholders() {
        let page = page(
            "https://site.test/chapter/1/",
            r#"<div id="reader">
                <img src="data:image/svg+xml;base64,AAAA" data-src="../../img/01.png">
                <img src="data:image/gif;base64,R0lG">
                <img src="/img/02.png">
            </div>"#,
        );

        assert_eq!(
            RULE.apply(&page),
            vec!["https://site.test/img/01.png", "https://site.test/img/02.png"]
        );
    }

    #[test]
    fn test_deny_matches_file_name_only() {
        let page = page(
            "https://site.test/",
            r#"<div id="reader">
                <img src="https://cdn.test/LOGO-dark.png">
                <img src="https://cdn.test/logos/page-01.png">
            </div>"#,
        );

        assert_eq!(RULE.apply(&page), vec!["https://cdn.test/logos/page-01.png"]);
    }

    #[test]
    fn test_allow_and_extension_requirements() {
        let rule = SelectionRule {
            selector: "img",
            attributes: &["src"],
            allow: &["wp-content"],
            deny: &[],
            require_image_extension: true,
        };
        let page = page(
            "https://site.test/",
            r#"<img src="https://site.test/wp-content/uploads/01.jpeg?v=2">
               <img src="https://site.test/wp-content/uploads/tracker.php">
               <img src="https://other.test/02.jpg">"#,
        );

        assert_eq!(
            rule.apply(&page),
            vec!["https://site.test/wp-content/uploads/01.jpeg?v=2"]
        );
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        let page = page("https://site.test/", "<p>Chapter removed</p>");
        assert!(RULE.apply(&page).is_empty());
    }
}
