use std::future::Future;
use std::time::Duration;

use crate::catalog::{CatalogMatch, ModLookup, ModPayload};
use crate::error::AppError;
use crate::filter::QueryFilter;
use crate::models::{Extracted, LinkList, Page, Query, QueryUpdate, Source};

/// Persists sources and query rows.
///
/// Implementations never retry internally; callers decide what a failure
/// means for the current cycle.
pub trait QueryStore: Send + Sync + Clone {
    fn get_source(&self, url: &str) -> impl Future<Output = Result<Source, AppError>> + Send;

    fn create_source(&self, source: &Source)
    -> impl Future<Output = Result<Source, AppError>> + Send;

    /// Fails with [`AppError::NotFound`] when the row does not exist.
    fn get_query(
        &self,
        source_url: &str,
        query_key: &str,
    ) -> impl Future<Output = Result<Query, AppError>> + Send;

    /// Insert an empty row. Fails with [`AppError::DuplicateKey`] when the
    /// identity already exists.
    fn create_query(
        &self,
        source_url: &str,
        query_key: &str,
    ) -> impl Future<Output = Result<Query, AppError>> + Send;

    fn find_queries(
        &self,
        filter: &QueryFilter,
    ) -> impl Future<Output = Result<Vec<Query>, AppError>> + Send;

    /// Write only the columns present in `update` and return the new row.
    fn update_query(
        &self,
        source_url: &str,
        query_key: &str,
        update: &QueryUpdate,
    ) -> impl Future<Output = Result<Query, AppError>> + Send;

    /// On-disk size of `table` in megabytes.
    fn table_size_mb(&self, table: &str) -> impl Future<Output = Result<f64, AppError>> + Send;
}

/// Fetch a row, creating it when absent. The flag is true when this call
/// inserted the row.
pub async fn get_or_create_query<S: QueryStore>(
    store: &S,
    source_url: &str,
    query_key: &str,
) -> Result<(Query, bool), AppError> {
    match store.get_query(source_url, query_key).await {
        Ok(row) => Ok((row, false)),
        Err(AppError::NotFound(_)) => match store.create_query(source_url, query_key).await {
            Ok(row) => Ok((row, true)),
            // Another stage inserted it between the two calls.
            Err(AppError::DuplicateKey(_)) => {
                let row = store.get_query(source_url, query_key).await?;
                Ok((row, false))
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    }
}

/// Ensure the source row exists.
pub async fn ensure_source<S: QueryStore>(store: &S, source: &Source) -> Result<Source, AppError> {
    match store.get_source(&source.url).await {
        Ok(existing) => Ok(existing),
        Err(AppError::NotFound(_)) => match store.create_source(source).await {
            Err(AppError::DuplicateKey(_)) => store.get_source(&source.url).await,
            other => other,
        },
        Err(e) => Err(e),
    }
}

/// Remote mod catalog.
pub trait CatalogApi: Send + Sync + Clone {
    /// Look up a mod. `Ok(None)` when the catalog has no match.
    fn find_mod(
        &self,
        lookup: &ModLookup,
    ) -> impl Future<Output = Result<Option<CatalogMatch>, AppError>> + Send;

    /// Create (`id = None`) or update a mod. Returns the catalog id.
    fn save_mod(
        &self,
        id: Option<i64>,
        payload: &ModPayload,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    fn delete_mod(&self, id: i64) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A page-rendering session (headless browser or plain HTTP).
///
/// Methods take `&mut self`: one navigation at a time per session. Share a
/// session between tasks through [`ExclusiveSession`](crate::session::ExclusiveSession).
pub trait BrowserSession: Send + 'static {
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    fn page_source(&mut self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Wait until `selector` matches on the current page. Fails with
    /// [`AppError::PageNotReady`] on timeout.
    fn wait_for(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Download `url` without navigating the current page.
    fn fetch_bytes(&mut self, url: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// Site-specific discovery and field extraction.
///
/// Every extractor defaults to [`Extracted::Unset`], except
/// [`auto_update`](Self::auto_update) which defaults to `true`.
pub trait SiteIntegration: Send + Sync {
    /// Human-readable site label used in logs.
    fn label(&self) -> &str;

    /// Path (relative to the source root) of the page listing candidates.
    fn listing_path(&self) -> &str;

    /// Selector that must be present before the listing is read.
    fn listing_ready(&self) -> Option<&str> {
        None
    }

    /// Query keys found on the listing page.
    fn candidate_keys(&self, listing: &Page) -> Vec<String>;

    /// Selector that must be present before a query page is read.
    fn ready_selector(&self) -> Option<&str> {
        None
    }

    fn ready_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    fn owner_id(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn view_url(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn category_id(&self, _page: &Page) -> Extracted<i64> {
        Extracted::Unset
    }

    fn banner(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn name(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn owner_name(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn description(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn description_short(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn install(&self, _page: &Page) -> Extracted<String> {
        Extracted::Unset
    }

    fn nsfw(&self, _page: &Page) -> Extracted<bool> {
        Extracted::Unset
    }

    fn auto_update(&self, _page: &Page) -> Extracted<bool> {
        Extracted::Value(true)
    }

    fn downloads(&self, _page: &Page) -> Extracted<LinkList> {
        Extracted::Unset
    }

    fn screenshots(&self, _page: &Page) -> Extracted<LinkList> {
        Extracted::Unset
    }

    fn installers(&self, _page: &Page) -> Extracted<LinkList> {
        Extracted::Unset
    }
}
