#![allow(dead_code)]

use mangagrab::config::StorageConfig;
use mangagrab::error::{GrabError, Result};
use mangagrab::orchestrator::{Orchestrator, OrchestratorSettings};
use mangagrab::storage::StorageManager;
use mangagrab::traits::{BrowserDriver, BrowsingSession, LoadCondition, RenderedPage};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

/// Scripted site served by [`FakeDriver`]. Fetching a URL returns the URL's bytes.
#[derive(Clone, Default)]
pub struct FakeSite {
    pub html: String,
    pub failing: HashSet<String>,
    pub hanging: HashSet<String>,
    pub navigation_error: Option<String>,
    pub navigation_hangs: bool,
    pub readiness_times_out: bool,
    pub evaluate_error: Option<String>,
}

impl FakeSite {
    pub fn with_images(urls: &[&str]) -> Self {
        let imgs: String = urls
            .iter()
            .map(|url| format!(r#"<img class="ts-main-image" src="{}">"#, url))
            .collect();
        Self {
            html: format!(
                r#"<html><body><div id="readerarea">{}</div></body></html>"#,
                imgs
            ),
            ..Default::default()
        }
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn hanging(mut self, url: &str) -> Self {
        self.hanging.insert(url.to_string());
        self
    }
}

#[derive(Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub fetched: Mutex<Vec<String>>,
    pub init_scripts: AtomicUsize,
    pub calls: Mutex<Vec<&'static str>>,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Session methods in the order they were invoked.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

pub struct FakeDriver {
    pub site: FakeSite,
    pub counters: Arc<Counters>,
}

impl FakeDriver {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            counters: Arc::new(Counters::default()),
        }
    }
}

#[async_trait::async_trait]
impl BrowserDriver for FakeDriver {
    async fn open(&self) -> Result<Box<dyn BrowsingSession>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: self.site.clone(),
            counters: self.counters.clone(),
            current: Mutex::new(None),
        }))
    }
}

pub struct FakeSession {
    site: FakeSite,
    counters: Arc<Counters>,
    current: Mutex<Option<Url>>,
}

#[async_trait::async_trait]
impl BrowsingSession for FakeSession {
    async fn add_init_script(&self, _script: &str) -> Result<()> {
        self.counters.init_scripts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&self, url: &Url, _load: LoadCondition) -> Result<()> {
        self.counters.record("navigate");
        if self.site.navigation_hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if let Some(ref message) = self.site.navigation_error {
            return Err(GrabError::navigation(message.clone()));
        }
        *self.current.lock().unwrap() = Some(url.clone());
        Ok(())
    }

    async fn wait_for_selector(&self, css: &str, _timeout: Duration) -> Result<()> {
        self.counters.record("wait_for_selector");
        if self.site.readiness_times_out {
            return Err(GrabError::timeout(format!("waiting for selector {}", css)));
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        self.counters.record("evaluate");
        if let Some(ref message) = self.site.evaluate_error {
            return Err(GrabError::browser(message.clone()));
        }
        Ok(serde_json::Value::Bool(true))
    }

    async fn content(&self) -> Result<RenderedPage> {
        self.counters.record("content");
        let url = self
            .current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GrabError::browser("no page loaded"))?;
        Ok(RenderedPage {
            url,
            html: self.site.html.clone(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.counters.fetched.lock().unwrap().push(url.to_string());
        if self.site.hanging.contains(url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.site.failing.contains(url) {
            return Err(GrabError::browser(format!("404 for {}", url)));
        }
        Ok(url.as_bytes().to_vec())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub const FAST: OrchestratorSettings = OrchestratorSettings {
    navigation_timeout: Duration::from_millis(200),
    image_timeout: Duration::from_millis(200),
};

/// Orchestrator over a fake site writing into a fresh temp root.
pub fn orchestrator(site: FakeSite) -> (Orchestrator, Arc<Counters>, TempDir) {
    let root = TempDir::new().expect("temp dir");
    let driver = FakeDriver::new(site);
    let counters = driver.counters.clone();
    let storage = StorageManager::new(&StorageConfig {
        downloads_root: root.path().to_path_buf(),
    });
    (Orchestrator::new(Arc::new(driver), storage, FAST), counters, root)
}

/// Sorted file names in a directory.
pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
