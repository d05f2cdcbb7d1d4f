//! Headless Chromium channel using chromiumoxide.

use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::debug;
use url::Url;

use super::Channel;
use crate::error::AcquireError;

const SELECTOR_POLL: Duration = Duration::from_millis(250);
/// How long a graceful CDP close may take before the process is killed.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Launches a browser per fetch and tears it down before returning.
#[derive(Debug, Clone, Default)]
pub struct BrowserChannel {
    chrome_path: Option<PathBuf>,
    /// CSS selector that must exist before the DOM is captured.
    wait_for: Option<String>,
}

impl BrowserChannel {
    pub fn new(chrome_path: Option<PathBuf>, wait_for: Option<String>) -> Self {
        Self {
            chrome_path,
            wait_for,
        }
    }
}

#[async_trait]
impl Channel for BrowserChannel {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch_raw_content(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<String, AcquireError> {
        let deadline = Instant::now() + timeout;
        let session = BrowserSession::launch(self.chrome_path.as_deref(), timeout).await?;

        let rendered = timeout_at(
            deadline,
            session.render(url.as_str(), self.wait_for.as_deref()),
        )
        .await;
        session.close().await;

        match rendered {
            Ok(result) => result,
            Err(_) => Err(AcquireError::Timeout { after: timeout }),
        }
    }
}

// -------------------------
// Scoped browser session
// -------------------------

/// One Chromium process and its CDP event loop.
///
/// `close` shuts the browser down gracefully. If the owning future is
/// cancelled instead, `Drop` stops the event loop and dropping `Browser`
/// kills the child process.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(chrome_path: Option<&Path>, timeout: Duration) -> Result<Self, AcquireError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .launch_timeout(timeout)
            .request_timeout(timeout);
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| AcquireError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AcquireError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn render(&self, url: &str, wait_for: Option<&str>) -> Result<String, AcquireError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| AcquireError::Browser(format!("navigation failed: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| AcquireError::Browser(format!("navigation failed: {e}")))?;

        if let Some(selector) = wait_for {
            while page.find_element(selector).await.is_err() {
                sleep(SELECTOR_POLL).await;
            }
        }

        let html = page
            .content()
            .await
            .map_err(|e| AcquireError::Browser(format!("failed to read page content: {e}")))?;
        if let Err(e) = page.close().await {
            debug!("page close failed: {e}");
        }
        Ok(html)
    }

    async fn close(mut self) {
        let browser = &mut self.browser;
        let graceful = async move {
            browser.close().await.map_err(|e| e.to_string())?;
            browser.wait().await.map_err(|e| e.to_string())?;
            Ok::<_, String>(())
        };
        if !finished_within(CLOSE_GRACE, graceful).await {
            if let Some(Err(e)) = self.browser.kill().await {
                debug!("browser kill failed: {e}");
            }
        }
        self.handler.abort();
    }
}

/// Whether `step` completed successfully inside `grace`.
async fn finished_within<F, E>(grace: Duration, step: F) -> bool
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match timeout(grace, step).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("browser shutdown failed: {e}");
            false
        }
        Err(_) => {
            debug!(grace_ms = grace.as_millis() as u64, "browser shutdown timed out");
            false
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
