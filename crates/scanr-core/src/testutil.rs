//! Test utilities: in-memory and mock implementations of the core traits.
//!
//! All mocks share state through `Arc<Mutex<_>>` so a clone handed to the
//! code under test can be inspected afterwards.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::catalog::{CatalogMatch, ModLookup, ModPayload};
use crate::error::AppError;
use crate::events::{RuntimeEvent, RuntimeReporter};
use crate::filter::QueryFilter;
use crate::models::{Extracted, LinkList, Page, Query, QueryUpdate, Source};
use crate::reconcile::ExtractedFields;
use crate::traits::{BrowserSession, CatalogApi, QueryStore, SiteIntegration};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    sources: HashMap<String, Source>,
    rows: BTreeMap<(String, String), Query>,
    table_size_mb: f64,
    failures: VecDeque<AppError>,
}

/// In-memory [`QueryStore`] following the same filter rules as PostgreSQL.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_table_size(&self, mb: f64) {
        self.state.lock().unwrap().table_size_mb = mb;
    }

    /// The next store call fails with `error`.
    pub fn fail_next(&self, error: AppError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn insert(&self, row: Query) {
        let key = (row.source_url.clone(), row.query_key.clone());
        self.state.lock().unwrap().rows.insert(key, row);
    }

    pub fn row(&self, source_url: &str, query_key: &str) -> Option<Query> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(&(source_url.to_string(), query_key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    fn take_failure(&self) -> Result<(), AppError> {
        match self.state.lock().unwrap().failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl QueryStore for MemoryStore {
    async fn get_source(&self, url: &str) -> Result<Source, AppError> {
        self.take_failure()?;
        self.state
            .lock()
            .unwrap()
            .sources
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("source {url}")))
    }

    async fn create_source(&self, source: &Source) -> Result<Source, AppError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        if state.sources.contains_key(&source.url) {
            return Err(AppError::DuplicateKey(format!("source {}", source.url)));
        }
        state.sources.insert(source.url.clone(), source.clone());
        Ok(source.clone())
    }

    async fn get_query(&self, source_url: &str, query_key: &str) -> Result<Query, AppError> {
        self.take_failure()?;
        self.row(source_url, query_key)
            .ok_or_else(|| AppError::NotFound(format!("query {source_url}{query_key}")))
    }

    async fn create_query(&self, source_url: &str, query_key: &str) -> Result<Query, AppError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        let key = (source_url.to_string(), query_key.to_string());
        if state.rows.contains_key(&key) {
            return Err(AppError::DuplicateKey(format!("query {source_url}{query_key}")));
        }
        let row = Query::shell(source_url, query_key);
        state.rows.insert(key, row.clone());
        Ok(row)
    }

    async fn find_queries(&self, filter: &QueryFilter) -> Result<Vec<Query>, AppError> {
        self.take_failure()?;
        let now = Utc::now();
        let mut rows: Vec<Query> = self
            .state
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|row| filter.matches(row, now))
            .cloned()
            .collect();

        if filter.random_order {
            rows.shuffle(&mut rand::rng());
        }
        if filter.order_by_last_parsed {
            // `None` sorts first, matching NULLS FIRST.
            rows.sort_by_key(|row| row.last_parsed);
        }
        rows.truncate(filter.limit);
        Ok(rows)
    }

    async fn update_query(
        &self,
        source_url: &str,
        query_key: &str,
        update: &QueryUpdate,
    ) -> Result<Query, AppError> {
        self.take_failure()?;
        let mut state = self.state.lock().unwrap();
        let row = state
            .rows
            .get_mut(&(source_url.to_string(), query_key.to_string()))
            .ok_or_else(|| AppError::NotFound(format!("query {source_url}{query_key}")))?;
        update.apply_to(row);
        Ok(row.clone())
    }

    async fn table_size_mb(&self, _table: &str) -> Result<f64, AppError> {
        self.take_failure()?;
        Ok(self.state.lock().unwrap().table_size_mb)
    }
}

// ---------------------------------------------------------------------------
// MockCatalog
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CatalogState {
    lookups: VecDeque<Result<Option<CatalogMatch>, AppError>>,
    saves: VecDeque<Result<i64, AppError>>,
    next_id: i64,
    looked_up: Vec<ModLookup>,
    saved: Vec<(Option<i64>, ModPayload)>,
}

/// Catalog double. Lookups default to "no match"; saves default to an
/// increasing id starting at 1000 (or echo the id on update).
#[derive(Clone)]
pub struct MockCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CatalogState {
                next_id: 1000,
                ..CatalogState::default()
            })),
        }
    }

    pub fn push_lookup(&self, result: Result<Option<CatalogMatch>, AppError>) {
        self.state.lock().unwrap().lookups.push_back(result);
    }

    pub fn push_save(&self, result: Result<i64, AppError>) {
        self.state.lock().unwrap().saves.push_back(result);
    }

    pub fn lookups(&self) -> Vec<ModLookup> {
        self.state.lock().unwrap().looked_up.clone()
    }

    pub fn saved(&self) -> Vec<(Option<i64>, ModPayload)> {
        self.state.lock().unwrap().saved.clone()
    }
}

impl CatalogApi for MockCatalog {
    async fn find_mod(&self, lookup: &ModLookup) -> Result<Option<CatalogMatch>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.looked_up.push(lookup.clone());
        state.lookups.pop_front().unwrap_or(Ok(None))
    }

    async fn save_mod(&self, id: Option<i64>, payload: &ModPayload) -> Result<i64, AppError> {
        let mut state = self.state.lock().unwrap();
        state.saved.push((id, payload.clone()));
        if let Some(result) = state.saves.pop_front() {
            return result;
        }
        match id {
            Some(id) => Ok(id),
            None => {
                let id = state.next_id;
                state.next_id += 1;
                Ok(id)
            }
        }
    }

    async fn delete_mod(&self, _id: i64) -> Result<(), AppError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionState {
    pages: HashMap<String, String>,
    assets: HashMap<String, Vec<u8>>,
    not_ready: Vec<String>,
    navigation_error: Option<AppError>,
    current: Option<String>,
    calls: Vec<String>,
}

/// Page session serving canned HTML. Unknown URLs render as an empty page.
#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<SessionState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page(&self, url: &str, html: &str) {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
    }

    pub fn set_asset(&self, url: &str, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .assets
            .insert(url.to_string(), bytes.to_vec());
    }

    /// Ready waits on `url` time out.
    pub fn fail_ready(&self, url: &str) {
        self.state.lock().unwrap().not_ready.push(url.to_string());
    }

    /// The next navigation fails with `error`.
    pub fn fail_navigation(&self, error: AppError) {
        self.state.lock().unwrap().navigation_error = Some(error);
    }

    /// Recorded calls: `navigate {url}`, `wait {url}`, `source {url}`,
    /// `fetch {url}`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn current(&self) -> String {
        self.state.lock().unwrap().current.clone().unwrap_or_default()
    }
}

impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> Result<(), AppError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("navigate {url}"));
        if let Some(e) = state.navigation_error.take() {
            return Err(e);
        }
        state.current = Some(url.to_string());
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, AppError> {
        tokio::task::yield_now().await;
        let url = self.current();
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("source {url}"));
        Ok(state.pages.get(&url).cloned().unwrap_or_default())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<(), AppError> {
        tokio::task::yield_now().await;
        let url = self.current();
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("wait {url}"));
        if state.not_ready.contains(&url) {
            return Err(AppError::PageNotReady(format!("{selector} on {url}")));
        }
        Ok(())
    }

    /// Unknown assets answer like a 404.
    async fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, AppError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("fetch {url}"));
        state
            .assets
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::HttpError(format!("HTTP 404 for {url}")))
    }
}

// ---------------------------------------------------------------------------
// MockSite
// ---------------------------------------------------------------------------

/// Site integration returning fixed field values for every page.
///
/// Candidate keys are the whitespace-separated tokens of the listing page
/// that start with `/`.
#[derive(Debug, Clone)]
pub struct MockSite {
    pub ready: Option<String>,
    pub fields: ExtractedFields,
}

impl MockSite {
    pub fn new() -> Self {
        Self {
            ready: None,
            fields: ExtractedFields {
                auto_update: Extracted::Value(true),
                ..ExtractedFields::default()
            },
        }
    }

    /// A site yielding a publishable mod in category `category`.
    pub fn complete(category: i64) -> Self {
        let mut site = Self::new();
        site.fields.category_id = Extracted::Value(category);
        site.fields.name = Extracted::Value("Rally Pack".into());
        site.fields.description = Extracted::Value("Fast cars".into());
        site.fields.view_url = Extracted::Value("rally-pack".into());
        site.fields.owner_id = Extracted::Value("owner-1".into());
        site.fields.banner = Extracted::Value("https://a.io/banner.png".into());
        site
    }

    pub fn with_ready(mut self, selector: &str) -> Self {
        self.ready = Some(selector.to_string());
        self
    }
}

impl SiteIntegration for MockSite {
    fn label(&self) -> &str {
        "mock"
    }

    fn listing_path(&self) -> &str {
        "/sitemap.xml"
    }

    fn candidate_keys(&self, listing: &Page) -> Vec<String> {
        listing
            .html
            .split_whitespace()
            .filter(|token| token.starts_with('/'))
            .map(str::to_string)
            .collect()
    }

    fn ready_selector(&self) -> Option<&str> {
        self.ready.as_deref()
    }

    fn ready_timeout(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn owner_id(&self, _page: &Page) -> Extracted<String> {
        self.fields.owner_id.clone()
    }

    fn view_url(&self, _page: &Page) -> Extracted<String> {
        self.fields.view_url.clone()
    }

    fn category_id(&self, _page: &Page) -> Extracted<i64> {
        self.fields.category_id.clone()
    }

    fn banner(&self, _page: &Page) -> Extracted<String> {
        self.fields.banner.clone()
    }

    fn name(&self, _page: &Page) -> Extracted<String> {
        self.fields.name.clone()
    }

    fn owner_name(&self, _page: &Page) -> Extracted<String> {
        self.fields.owner_name.clone()
    }

    fn description(&self, _page: &Page) -> Extracted<String> {
        self.fields.description.clone()
    }

    fn description_short(&self, _page: &Page) -> Extracted<String> {
        self.fields.description_short.clone()
    }

    fn install(&self, _page: &Page) -> Extracted<String> {
        self.fields.install.clone()
    }

    fn nsfw(&self, _page: &Page) -> Extracted<bool> {
        self.fields.nsfw.clone()
    }

    fn auto_update(&self, _page: &Page) -> Extracted<bool> {
        self.fields.auto_update.clone()
    }

    fn downloads(&self, _page: &Page) -> Extracted<LinkList> {
        self.fields.downloads.clone()
    }

    fn screenshots(&self, _page: &Page) -> Extracted<LinkList> {
        self.fields.screenshots.clone()
    }

    fn installers(&self, _page: &Page) -> Extracted<LinkList> {
        self.fields.installers.clone()
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Records every event as a short line.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.events().iter().any(|e| e.starts_with(prefix))
    }
}

impl RuntimeReporter for MockReporter {
    fn report(&self, event: RuntimeEvent<'_>) {
        let line = match event {
            RuntimeEvent::Started { source, .. } => format!("started {source}"),
            RuntimeEvent::StatusChanged { from, to, .. } => format!("status {from}->{to}"),
            RuntimeEvent::CycleSkipped { stage, reason, .. } => {
                format!("cycle skipped {stage}: {reason}")
            }
            RuntimeEvent::CycleStarted {
                stage, candidates, ..
            } => format!("cycle started {stage} {candidates}"),
            RuntimeEvent::QueryDiscovered { query, .. } => format!("discovered {query}"),
            RuntimeEvent::QueryExtracted { query, .. } => format!("extracted {query}"),
            RuntimeEvent::QueryAvoided { query, .. } => format!("avoided {query}"),
            RuntimeEvent::QueryPublished {
                query,
                mod_id,
                created,
                ..
            } => format!("published {query} {mod_id} created={created}"),
            RuntimeEvent::QuerySkipped {
                stage,
                query,
                reason,
                ..
            } => format!("skipped {stage} {query}: {reason}"),
            RuntimeEvent::ItemFailed {
                stage,
                query,
                error,
                ..
            } => format!("failed {stage} {query}: {error}"),
            RuntimeEvent::CycleFinished {
                stage, processed, ..
            } => format!("cycle finished {stage} {processed}"),
            RuntimeEvent::CycleAborted { stage, error, .. } => {
                format!("cycle aborted {stage}: {error}")
            }
            RuntimeEvent::Stopped { source } => format!("stopped {source}"),
        };
        self.events.lock().unwrap().push(line);
    }
}
