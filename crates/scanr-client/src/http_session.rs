use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::Client;
use scanr_core::AppError;
use scanr_core::traits::BrowserSession;
use scraper::{Html, Selector};

use crate::map_send_error;

/// Pick a random entry from the configured user agents.
pub fn pick_user_agent(agents: &[String]) -> Option<&str> {
    agents.choose(&mut rand::rng()).map(String::as_str)
}

/// Page session over plain HTTP.
///
/// Pages are not rendered, so a ready selector either matches the served
/// document or never will; [`wait_for`](BrowserSession::wait_for) checks it
/// once instead of polling.
pub struct HttpSession {
    client: Client,
    timeout_secs: u64,
    current: Option<LoadedPage>,
}

struct LoadedPage {
    url: String,
    html: String,
}

impl HttpSession {
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(user_agent, timeout)?,
            timeout_secs: timeout.as_secs(),
            current: None,
        })
    }

    fn loaded(&self) -> Result<&LoadedPage, AppError> {
        self.current
            .as_ref()
            .ok_or_else(|| AppError::Generic("No page loaded in session".into()))
    }
}

pub(crate) fn build_client(user_agent: Option<&str>, timeout: Duration) -> Result<Client, AppError> {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    builder
        .build()
        .map_err(|e| AppError::HttpError(e.to_string()))
}

/// GET `url`, failing on a non-success status.
async fn get_success(
    client: &Client,
    url: &str,
    timeout_secs: u64,
) -> Result<reqwest::Response, AppError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| map_send_error(e, timeout_secs))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::HttpError(format!(
            "HTTP {} for {}",
            status.as_u16(),
            url
        )));
    }
    Ok(response)
}

pub(crate) async fn download(
    client: &Client,
    url: &str,
    timeout_secs: u64,
) -> Result<Vec<u8>, AppError> {
    let body = get_success(client, url, timeout_secs)
        .await?
        .bytes()
        .await
        .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;
    Ok(body.to_vec())
}

fn selector_present(html: &str, selector: &str) -> Result<bool, AppError> {
    let selector = Selector::parse(selector)
        .map_err(|e| AppError::ConfigError(format!("Invalid selector '{selector}': {e:?}")))?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

impl BrowserSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), AppError> {
        self.current = None;

        let html = get_success(&self.client, url, self.timeout_secs)
            .await?
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        self.current = Some(LoadedPage {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, AppError> {
        Ok(self.loaded()?.html.clone())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<(), AppError> {
        let page = self.loaded()?;
        if selector_present(&page.html, selector)? {
            Ok(())
        } else {
            Err(AppError::PageNotReady(format!(
                "'{selector}' not present on {}",
                page.url
            )))
        }
    }

    async fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, AppError> {
        download(&self.client, url, self.timeout_secs).await
    }
}
