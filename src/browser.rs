//! Headless Chromium binding for [`BrowserDriver`] / [`BrowsingSession`].
//!
//! Every [`ChromiumDriver::open`] launches its own browser process, so sessions never
//! share cookies or tabs. Image fetches go through reqwest with the cookies the browser
//! would send to that image URL and the page URL as referrer, which keeps per-site
//! session state without round-tripping image bytes through the devtools protocol.

use crate::config::BrowserConfig;
use crate::error::{GrabError, Result};
use crate::traits::{BrowserDriver, BrowsingSession, LoadCondition, RenderedPage};
use crate::utils::{HttpClient, SessionCookies};
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::network::GetCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_STABLE_POLLS: u32 = 2;

/// True once the navigated document has been parsed; the initial `about:blank` never counts.
const DOM_READY: &str =
    "document.readyState !== 'loading' && location.href !== 'about:blank'";

pub struct ChromiumDriver {
    config: BrowserConfig,
    http: HttpClient,
}

impl ChromiumDriver {
    pub fn new(config: BrowserConfig) -> Result<Self> {
        let http = HttpClient::new(config.user_agent.as_deref(), config.image_timeout())?;
        Ok(Self { config, http })
    }

    fn launch_config(&self) -> Result<LaunchConfig> {
        let mut builder = LaunchConfig::builder()
            .window_size(self.config.window_width, self.config.window_height)
            .request_timeout(self.config.navigation_timeout())
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio");

        if !self.config.headless {
            builder = builder.with_head();
        }

        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(ref chrome_path) = self.config.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        builder.build().map_err(GrabError::browser)
    }

    async fn open_page(&self, browser: &Browser) -> Result<Page> {
        let page = browser.new_page("about:blank").await?;
        if let Some(ref user_agent) = self.config.user_agent {
            page.set_user_agent(user_agent.clone()).await?;
        }
        Ok(page)
    }
}

#[async_trait::async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open(&self) -> Result<Box<dyn BrowsingSession>> {
        let (browser, mut handler) = Browser::launch(self.launch_config()?).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        let page = match self.open_page(&browser).await {
            Ok(page) => page,
            Err(e) => {
                shutdown(browser, handler_task).await;
                return Err(e);
            }
        };

        info!("Headless browser session opened");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            http: self.http.clone(),
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    http: HttpClient,
}

impl ChromiumSession {
    /// Cookies the browser would attach to a request for `url`, scoped by its own
    /// domain, path and secure rules.
    async fn cookies_for(&self, url: &str) -> SessionCookies {
        match self.page.execute(cookie_query(url)).await {
            Ok(response) => response
                .result
                .cookies
                .into_iter()
                .map(|cookie| (cookie.name, cookie.value))
                .collect(),
            Err(e) => {
                warn!("Could not read session cookies for {}: {e}", url);
                Vec::new()
            }
        }
    }

    /// Starts navigation without waiting for the `load` event, then waits for the parsed DOM.
    async fn navigate_until_dom_ready(&self, url: &Url) -> Result<()> {
        let response = self
            .page
            .execute(NavigateParams::new(url.as_str()))
            .await
            .map_err(|e| GrabError::navigation(format!("Failed to load {}: {}", url, e)))?;

        if let Some(error) = response.result.error_text.as_deref() {
            return Err(GrabError::navigation(format!("Failed to load {}: {}", url, error)));
        }

        // Evaluation can fail while the old execution context is torn down; keep polling.
        while !matches!(self.evaluate(DOM_READY).await, Ok(ready) if ready.as_bool() == Some(true)) {
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Ok(())
    }

    /// Waits until the number of resource-timing entries stops growing.
    async fn wait_for_network_idle(&self) -> Result<()> {
        let mut last = -1i64;
        let mut stable = 0;

        while stable < IDLE_STABLE_POLLS {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            let count = self
                .evaluate("performance.getEntriesByType('resource').length")
                .await?
                .as_i64()
                .unwrap_or(0);

            if count == last {
                stable += 1;
            } else {
                stable = 0;
                last = count;
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl BrowsingSession for ChromiumSession {
    async fn add_init_script(&self, script: &str) -> Result<()> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await?;
        Ok(())
    }

    async fn navigate(&self, url: &Url, load: LoadCondition) -> Result<()> {
        debug!("Browser navigating to: {}", url);

        if !waits_for_load_event(load) {
            return self.navigate_until_dom_ready(url).await;
        }

        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| GrabError::navigation(format!("Failed to load {}: {}", url, e)))?;

        if load == LoadCondition::NetworkIdle {
            self.wait_for_network_idle().await?;
        }

        Ok(())
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<()> {
        let script = format!("document.querySelector({}) !== null", serde_json::to_string(css)?);
        let deadline = Instant::now() + timeout;

        loop {
            if self.evaluate(&script).await?.as_bool() == Some(true) {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(GrabError::timeout(format!("waiting for selector {}", css)));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<RenderedPage> {
        let html = self.page.content().await?;
        let current = self
            .page
            .url()
            .await?
            .ok_or_else(|| GrabError::browser("page has no URL"))?;

        Ok(RenderedPage {
            url: Url::parse(&current)?,
            html,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let referer = self.page.url().await.ok().flatten();
        let cookies = self.cookies_for(url).await;
        self.http.get_bytes(url, referer.as_deref(), &cookies).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            browser,
            page,
            handler_task,
            ..
        } = *self;

        if let Err(e) = page.close().await {
            warn!("Failed to close page: {e}");
        }

        shutdown(browser, handler_task).await;
        Ok(())
    }
}

/// `goto` resolves on the `load` event, which is too late for `DomContentLoaded`.
fn waits_for_load_event(load: LoadCondition) -> bool {
    !matches!(load, LoadCondition::DomContentLoaded)
}

fn cookie_query(url: &str) -> GetCookiesParams {
    GetCookiesParams::builder().urls(vec![url.to_string()]).build()
}

async fn shutdown(mut browser: Browser, handler_task: JoinHandle<()>) {
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser: {e}");
    }

    if let Err(e) = browser.wait().await {
        warn!("Failed to reap browser process: {e}");
    }

    handler_task.abort();
    info!("Headless browser session closed");
}
