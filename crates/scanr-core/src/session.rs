//! Exclusive-turn access to a shared page session.
//!
//! Discovery and extraction both drive the same session. A turn covers
//! navigation, the ready wait and the page read, so one stage can never
//! read a page the other navigated to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::traits::BrowserSession;

/// A page read within one exclusive turn.
#[derive(Debug)]
pub struct PageLoad {
    pub html: String,
    /// Outcome of the ready wait. The HTML is captured either way so a
    /// failed page can be dumped for diagnosis.
    pub ready: Result<(), AppError>,
}

/// Cloneable handle around a single [`BrowserSession`].
pub struct ExclusiveSession<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for ExclusiveSession<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BrowserSession> ExclusiveSession<B> {
    pub fn new(session: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Navigate to `url`, wait for `ready` (if any) and read the page.
    ///
    /// Navigation and read failures are returned as errors. A ready-wait
    /// failure is reported in [`PageLoad::ready`] unless it is a session
    /// failure.
    pub async fn load(
        &self,
        url: &str,
        ready: Option<&str>,
        timeout: Duration,
    ) -> Result<PageLoad, AppError> {
        let mut session = self.inner.lock().await;

        session.navigate(url).await?;

        let ready = match ready {
            Some(selector) => match session.wait_for(selector, timeout).await {
                Err(e) if e.is_fatal() => return Err(e),
                other => other,
            },
            None => Ok(()),
        };

        let html = session.page_source().await?;
        Ok(PageLoad { html, ready })
    }

    /// Download `url` within one turn, leaving the current page alone.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.inner.lock().await.fetch_bytes(url).await
    }
}
