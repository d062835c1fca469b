use crate::error::{GrabError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Closed set of sites with a working adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteId {
    Eros,
    Asura,
    Madara,
}

impl SiteId {
    pub const ALL: [SiteId; 3] = [SiteId::Eros, SiteId::Asura, SiteId::Madara];

    /// Identifiers accepted at the HTTP boundary; the first one is canonical.
    pub fn identifiers(&self) -> &'static [&'static str] {
        match self {
            SiteId::Eros => &["erosscans", "eros"],
            SiteId::Asura => &["asurascans", "asura"],
            SiteId::Madara => &["madara", "thunder"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.identifiers()[0]
    }
}

impl FromStr for SiteId {
    type Err = GrabError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        SiteId::ALL
            .into_iter()
            .find(|site| site.identifiers().contains(&needle.as_str()))
            .ok_or_else(|| GrabError::site_not_supported(s.trim()))
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive chapter range hint for adapters that can resolve multiple chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRange {
    pub start: u32,
    pub end: Option<u32>,
}

impl ChapterRange {
    pub fn new(start: u32, end: Option<u32>) -> Result<Self> {
        if let Some(end) = end {
            if end < start {
                return Err(GrabError::invalid_request(format!(
                    "chapterEnd ({}) is before chapterStart ({})",
                    end, start
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Builds the optional range carried by a request. An end without a start is rejected.
    pub fn from_bounds(start: Option<u32>, end: Option<u32>) -> Result<Option<Self>> {
        match (start, end) {
            (Some(start), end) => Self::new(start, end).map(Some),
            (None, Some(end)) => Err(GrabError::invalid_request(format!(
                "chapterEnd ({}) given without chapterStart",
                end
            ))),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source_url: Url,
    pub site: SiteId,
    /// Raw title; sanitized by the storage layer before it touches the filesystem.
    pub title: String,
    pub chapters: Option<ChapterRange>,
}

impl DownloadRequest {
    pub fn new(source_url: &str, site: SiteId, title: Option<&str>) -> Result<Self> {
        let source_url = parse_source_url(source_url)?;
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => default_title(&source_url),
        };

        Ok(Self {
            source_url,
            site,
            title,
            chapters: None,
        })
    }

    pub fn with_chapters(mut self, chapters: Option<ChapterRange>) -> Self {
        self.chapters = chapters;
        self
    }
}

/// Accepts only absolute http(s) URLs.
pub fn parse_source_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| GrabError::invalid_request(format!("Invalid URL '{}': {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        scheme => Err(GrabError::invalid_request(format!(
            "Unsupported URL scheme '{}' in {}",
            scheme, raw
        ))),
    }
}

/// Last non-empty path segment of the URL, or a timestamped fallback.
fn default_title(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .unwrap_or_else(|| format!("manga-{}", chrono::Utc::now().timestamp_millis()))
}

/// Outcome of one orchestration.
///
/// Serializes to one of three shapes: `{success:true, count}`, `{success:false, count:0}`
/// (nothing found) or `{success:false, count:0, error}` (hard failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub success: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub candidates: usize,
    #[serde(skip)]
    pub folder: Option<PathBuf>,
}

impl DownloadResult {
    pub fn completed(count: usize, candidates: usize, folder: PathBuf) -> Self {
        Self {
            success: true,
            count,
            error: None,
            candidates,
            folder: Some(folder),
        }
    }

    pub fn no_content() -> Self {
        Self {
            success: false,
            count: 0,
            error: None,
            candidates: 0,
            folder: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            error: Some(error.into()),
            candidates: 0,
            folder: None,
        }
    }

    pub fn is_no_content(&self) -> bool {
        !self.success && self.error.is_none()
    }
}

/// Orchestrator state for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Navigating,
    Extracting,
    Downloading,
    Completed,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Navigating => write!(f, "navigating"),
            Stage::Extracting => write!(f, "extracting"),
            Stage::Downloading => write!(f, "downloading"),
            Stage::Completed => write!(f, "completed"),
            Stage::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_parsing_is_case_insensitive() {
        assert_eq!("ErosScans".parse::<SiteId>().unwrap(), SiteId::Eros);
        assert_eq!(" ASURA ".parse::<SiteId>().unwrap(), SiteId::Asura);
        assert_eq!("thunder".parse::<SiteId>().unwrap(), SiteId::Madara);
        assert!(matches!(
            "colamanga".parse::<SiteId>(),
            Err(GrabError::SiteNotSupported(site)) if site == "colamanga"
        ));
    }

    #[test]
    fn test_request_rejects_relative_and_non_http_urls() {
        assert!(DownloadRequest::new("/chapter-1", SiteId::Eros, None).is_err());
        assert!(DownloadRequest::new("ftp://host/a.jpg", SiteId::Eros, None).is_err());
        assert!(DownloadRequest::new("not a url", SiteId::Eros, None).is_err());
    }

    #[test]
    fn test_request_title_defaults_to_last_path_segment() {
        let request =
            DownloadRequest::new("https://erosscans.com/solo-leveling-chapter-3/", SiteId::Eros, None)
                .unwrap();
        assert_eq!(request.title, "solo-leveling-chapter-3");

        let request = DownloadRequest::new("https://erosscans.com/", SiteId::Eros, Some("  ")).unwrap();
        assert!(request.title.starts_with("manga-"));

        let request =
            DownloadRequest::new("https://erosscans.com/x", SiteId::Eros, Some("My Title")).unwrap();
        assert_eq!(request.title, "My Title");
    }

    #[test]
    fn test_chapter_range_validation() {
        assert!(ChapterRange::new(3, Some(5)).is_ok());
        assert!(ChapterRange::new(3, None).is_ok());
        assert!(matches!(
            ChapterRange::new(5, Some(3)),
            Err(GrabError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_chapter_range_from_bounds() {
        assert_eq!(ChapterRange::from_bounds(None, None).unwrap(), None);
        assert_eq!(
            ChapterRange::from_bounds(Some(2), None).unwrap(),
            Some(ChapterRange { start: 2, end: None })
        );
        assert!(matches!(
            ChapterRange::from_bounds(None, Some(4)),
            Err(GrabError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_result_shapes() {
        let done = serde_json::to_value(DownloadResult::completed(4, 5, PathBuf::from("x"))).unwrap();
        assert_eq!(done, serde_json::json!({"success": true, "count": 4}));

        let empty = DownloadResult::no_content();
        assert!(empty.is_no_content());
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            serde_json::json!({"success": false, "count": 0})
        );

        let failed = DownloadResult::failed("net::ERR_NAME_NOT_RESOLVED");
        assert!(!failed.is_no_content());
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"success": false, "count": 0, "error": "net::ERR_NAME_NOT_RESOLVED"})
        );
    }
}
