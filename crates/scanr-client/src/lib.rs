#[cfg(feature = "browser")]
pub mod browser_session;
pub mod catalog;
pub mod http_session;
pub mod markdown;
pub mod sites;

#[cfg(feature = "browser")]
pub use browser_session::ChromiumSession;
pub use catalog::ModCatalogClient;
pub use http_session::{HttpSession, pick_user_agent};
pub use markdown::MarkdownConverter;
pub use sites::{SitemapSite, register_builtin};

use scanr_core::AppError;

/// Classify a reqwest send failure.
pub(crate) fn map_send_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}
