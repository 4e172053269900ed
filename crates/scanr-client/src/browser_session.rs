use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use reqwest::Client;
use scanr_core::AppError;
use scanr_core::traits::BrowserSession;
use tokio::task::JoinHandle;

use crate::http_session::{build_client, download};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Headless Chromium session driven over the DevTools protocol.
///
/// One browser process and one tab per session. Navigation and reads fail
/// with [`AppError::SessionFailure`] once the CDP connection is gone, which
/// stops the source runtime so its supervisor can start a fresh process.
/// Images and other assets are fetched over plain HTTP with the same user
/// agent.
pub struct ChromiumSession {
    _browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    assets: Client,
    timeout: Duration,
}

impl ChromiumSession {
    /// Launch Chromium. `binary` overrides the executable lookup.
    pub async fn launch(
        binary: Option<&Path>,
        user_agent: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .request_timeout(timeout);

        if let Some(bin) = binary.map(Path::to_path_buf).or_else(find_chrome_binary) {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        if let Some(agent) = user_agent {
            builder = builder.arg(format!("--user-agent={agent}"));
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::SessionFailure(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::SessionFailure(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::SessionFailure(format!("Failed to open tab: {e}")))?;

        Ok(Self {
            _browser: browser,
            page,
            handler,
            assets: build_client(user_agent, timeout)?,
            timeout,
        })
    }

    /// A dead CDP connection is a session failure; anything else is a
    /// per-page error.
    fn classify(&self, what: &str, e: impl std::fmt::Display) -> AppError {
        if self.handler.is_finished() {
            AppError::SessionFailure(format!("{what}: browser connection closed ({e})"))
        } else {
            AppError::HttpError(format!("{what}: {e}"))
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), AppError> {
        match tokio::time::timeout(self.timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(self.classify(&format!("Failed to navigate to {url}"), e)),
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn page_source(&mut self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| self.classify("Failed to read page content", e))
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), AppError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if self.handler.is_finished() {
                return Err(AppError::SessionFailure(
                    "Browser connection closed while waiting for page".into(),
                ));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::PageNotReady(format!(
                    "'{selector}' not present after {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, AppError> {
        download(&self.assets, url, self.timeout.as_secs()).await
    }
}

/// Locate a real Chrome/Chromium binary.
///
/// `CHROME_BIN` wins; then the binary inside a snap (its wrapper strips
/// headless flags), flatpak, and the usual system paths. `None` leaves the
/// lookup to chromiumoxide.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
