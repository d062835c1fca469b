use crate::config::StorageConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Byte budget for a folder name; most filesystems cap a name at 255 bytes.
const MAX_TITLE_BYTES: usize = 200;
const UNTITLED: &str = "untitled";

#[derive(Debug, Clone)]
pub struct StorageManager {
    root: PathBuf,
}

impl StorageManager {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.downloads_root.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates (or reuses) `<root>/<sanitized title>`.
    pub async fn chapter_dir(&self, title: &str) -> Result<PathBuf> {
        let path = self.root.join(sanitize_title(title));

        // Create directory if it doesn't exist
        tokio::fs::create_dir_all(&path).await?;
        debug!("Chapter folder ready: {:?}", path);

        Ok(path)
    }

    pub fn page_path(&self, chapter_dir: &Path, index: usize, extension: &str) -> PathBuf {
        chapter_dir.join(page_file_name(index, extension))
    }

    /// Overwrites any existing file at `path`.
    pub async fn write_page(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// Reduces a title to a single path component made of alphanumerics, `-` and `_`.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        let c = if c.is_alphanumeric() || c == '-' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let is_edge = |c: char| c == '_' || c == '-';
    let trimmed = truncate_bytes(out.trim_matches(is_edge), MAX_TITLE_BYTES).trim_end_matches(is_edge);

    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }

    let end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= max)
        .last()
        .unwrap_or(0);
    &s[..end]
}

/// `1` + `.webp` -> `001.webp`
pub fn page_file_name(index: usize, extension: &str) -> String {
    format!("{:03}{}", index, extension)
}

/// Extension of the URL's path (query and fragment ignored), lowercased with a leading dot.
pub fn infer_extension(url: &str, fallback: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| {
            let name = url.path_segments()?.last()?.to_string();
            let (stem, ext) = name.rsplit_once('.')?;
            let valid = !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            valid.then(|| format!(".{}", ext.to_ascii_lowercase()))
        })
        .unwrap_or_else(|| fallback.to_string())
}
