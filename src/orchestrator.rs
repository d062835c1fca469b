use crate::config::BrowserConfig;
use crate::error::{GrabError, Result};
use crate::models::{DownloadRequest, DownloadResult, Stage};
use crate::storage::{infer_extension, StorageManager};
use crate::traits::{BrowserDriver, BrowsingSession, Readiness, SiteAdapter};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub navigation_timeout: Duration,
    pub image_timeout: Duration,
}

impl From<&BrowserConfig> for OrchestratorSettings {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout(),
            image_timeout: config.image_timeout(),
        }
    }
}

/// Runs one chapter download: navigate, extract, download, always closing the session.
pub struct Orchestrator {
    driver: Arc<dyn BrowserDriver>,
    storage: StorageManager,
    settings: OrchestratorSettings,
}

enum Extraction {
    Empty,
    Downloaded {
        count: usize,
        candidates: usize,
        folder: PathBuf,
    },
}

impl Orchestrator {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        storage: StorageManager,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            driver,
            storage,
            settings,
        }
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub async fn run(&self, request: &DownloadRequest, adapter: &dyn SiteAdapter) -> DownloadResult {
        self.run_with_progress(request, adapter, &ProgressBar::hidden())
            .await
    }

    pub async fn run_with_progress(
        &self,
        request: &DownloadRequest,
        adapter: &dyn SiteAdapter,
        progress: &ProgressBar,
    ) -> DownloadResult {
        let job = Uuid::new_v4();
        let span = info_span!("download", %job, site = %adapter.site(), title = %request.title);

        async {
            info!("Starting download: {}", request.source_url);
            let mut stage = Stage::Idle;

            let outcome = self.execute(request, adapter, progress, &mut stage).await;

            match outcome {
                Ok(Extraction::Downloaded {
                    count,
                    candidates,
                    folder,
                }) => {
                    transition(&mut stage, Stage::Completed);
                    info!(
                        "Download completed: {}/{} images saved to {:?}",
                        count, candidates, folder
                    );
                    DownloadResult::completed(count, candidates, folder)
                }
                Ok(Extraction::Empty) => {
                    transition(&mut stage, Stage::Failed);
                    warn!("No images found on {}", request.source_url);
                    DownloadResult::no_content()
                }
                Err(e) => {
                    error!(%stage, "Download failed: {}", e);
                    transition(&mut stage, Stage::Failed);
                    DownloadResult::failed(e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Acquires a session and guarantees it is closed exactly once on every path.
    async fn execute(
        &self,
        request: &DownloadRequest,
        adapter: &dyn SiteAdapter,
        progress: &ProgressBar,
        stage: &mut Stage,
    ) -> Result<Extraction> {
        let session = self.driver.open().await?;

        let outcome = self
            .drive(session.as_ref(), request, adapter, progress, stage)
            .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browsing session: {}", e);
        }

        outcome
    }

    async fn drive(
        &self,
        session: &dyn BrowsingSession,
        request: &DownloadRequest,
        adapter: &dyn SiteAdapter,
        progress: &ProgressBar,
        stage: &mut Stage,
    ) -> Result<Extraction> {
        transition(stage, Stage::Navigating);
        self.navigate(session, request, adapter).await?;

        transition(stage, Stage::Extracting);
        if let Err(e) = adapter.pre_step(session).await {
            warn!("Pre-extraction step failed, extracting anyway: {}", e);
        }

        if let Some(range) = request.chapters {
            if !adapter.supports_chapter_range() {
                info!(
                    "Chapter range {}..{:?} ignored: {} downloads a single chapter",
                    range.start,
                    range.end,
                    adapter.site()
                );
            }
        }

        let page = session.content().await?;
        let urls = adapter.select_image_urls(&page);
        info!("Found {} images", urls.len());
        if urls.is_empty() {
            return Ok(Extraction::Empty);
        }

        transition(stage, Stage::Downloading);
        let folder = self.storage.chapter_dir(&request.title).await?;
        let count = self
            .download_all(session, &urls, &folder, adapter.fallback_extension(), progress)
            .await;

        Ok(Extraction::Downloaded {
            count,
            candidates: urls.len(),
            folder,
        })
    }

    async fn navigate(
        &self,
        session: &dyn BrowsingSession,
        request: &DownloadRequest,
        adapter: &dyn SiteAdapter,
    ) -> Result<()> {
        for script in adapter.init_scripts() {
            session.add_init_script(script).await?;
        }

        let policy = adapter.wait_policy();
        tokio::time::timeout(
            self.settings.navigation_timeout,
            session.navigate(&request.source_url, policy.load),
        )
        .await
        .map_err(|_| {
            GrabError::timeout(format!(
                "navigation to {} exceeded {:?}",
                request.source_url, self.settings.navigation_timeout
            ))
        })??;

        match policy.readiness {
            Readiness::Immediate => {}
            Readiness::Delay(delay) => tokio::time::sleep(delay).await,
            Readiness::Selector { css, timeout } => {
                if let Err(e) = session.wait_for_selector(css, timeout).await {
                    warn!("Page not ready ({}), extracting anyway", e);
                }
            }
        }

        Ok(())
    }

    /// Sequential, in order; a failed image is logged and skipped. Returns the number written.
    async fn download_all(
        &self,
        session: &dyn BrowsingSession,
        urls: &[String],
        folder: &std::path::Path,
        fallback_extension: &str,
        progress: &ProgressBar,
    ) -> usize {
        progress.set_length(urls.len() as u64);
        let mut count = 0;

        for (offset, url) in urls.iter().enumerate() {
            let index = offset + 1;
            progress.set_message(format!("page {}", index));

            match self.download_one(session, url, folder, index, fallback_extension).await {
                Ok(path) => {
                    count += 1;
                    debug!("Downloaded: {:?}", path);
                }
                Err(e) => warn!("Failed to download image {} ({}): {}", index, url, e),
            }

            progress.inc(1);
        }

        progress.finish_with_message("Download completed");
        count
    }

    async fn download_one(
        &self,
        session: &dyn BrowsingSession,
        url: &str,
        folder: &std::path::Path,
        index: usize,
        fallback_extension: &str,
    ) -> Result<PathBuf> {
        let bytes = tokio::time::timeout(self.settings.image_timeout, session.fetch(url))
            .await
            .map_err(|_| GrabError::timeout(format!("fetch exceeded {:?}", self.settings.image_timeout)))??;

        let extension = infer_extension(url, fallback_extension);
        let path = self.storage.page_path(folder, index, &extension);
        self.storage.write_page(&path, &bytes).await?;
        Ok(path)
    }
}

fn transition(stage: &mut Stage, next: Stage) {
    debug!("Stage {} -> {}", stage, next);
    *stage = next;
}
