use std::path::PathBuf;

use base64::Engine;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::Pipeline;
use crate::error::AppError;
use crate::events::{RuntimeEvent, RuntimeReporter, Stage};
use crate::filter::{QueryFilter, exists_filter};
use crate::models::{Page, Query, QueryUpdate};
use crate::reconcile::{ExtractedFields, ExtractionDecision, reconcile_extraction};
use crate::traits::{BrowserSession, CatalogApi, QueryStore, get_or_create_query};

impl<S, C, B> Pipeline<S, C, B>
where
    S: QueryStore,
    C: CatalogApi,
    B: BrowserSession,
{
    /// Selection for one extraction cycle.
    pub fn extraction_filter(&self) -> QueryFilter {
        let exists = exists_filter(self.source.parse_new, self.source.parse_existing);
        // Re-parsing published items only covers categories still configured.
        let categories = (exists == Some(true)).then(|| self.source.category_ids());

        QueryFilter::for_source(&self.source.url)
            .allow(true)
            .exists(exists)
            .category_ids(categories)
            .order_by_last_parsed(true)
            .random()
            .limit(self.source.limit)
    }

    pub(super) async fn extract<R: RuntimeReporter>(
        &self,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<usize, AppError> {
        let filter = self.extraction_filter();
        let rows = self.store.find_queries(&filter).await?;

        reporter.report(RuntimeEvent::CycleStarted {
            source: &self.source.url,
            stage: Stage::Extraction,
            candidates: rows.len(),
        });

        let published_only = filter.exists == Some(true);
        let mut processed = 0;
        for row in &rows {
            if cancel.is_cancelled() {
                break;
            }
            processed += 1;

            if let Err(e) = self.extract_one(row, published_only, reporter).await {
                self.item_failed(Stage::Extraction, &row.query_key, e, reporter)?;
            }
        }

        Ok(processed)
    }

    async fn extract_one<R: RuntimeReporter>(
        &self,
        row: &Query,
        published_only: bool,
        reporter: &R,
    ) -> Result<(), AppError> {
        let source = self.source.url.as_str();
        let url = row.page_url(&self.source.protocol);

        let load = self
            .session
            .load(&url, self.site.ready_selector(), self.site.ready_timeout())
            .await?;

        if let Err(not_ready) = load.ready {
            if self.source.log_page_fail_output {
                self.dump_failed_page(&load.html).await;
            }
            // Keep a stuck published item from being selected forever.
            if published_only {
                self.store
                    .update_query(
                        &row.source_url,
                        &row.query_key,
                        &QueryUpdate::new().last_parsed(Utc::now()),
                    )
                    .await?;
            }
            return Err(not_ready);
        }

        let page = Page {
            url,
            query_key: row.query_key.clone(),
            html: load.html,
        };
        let fields = ExtractedFields::collect(self.site.as_ref(), &page);
        fields.valid_category()?;

        let (current, _) = get_or_create_query(&self.store, &row.source_url, &row.query_key).await?;

        match reconcile_extraction(&current, fields, &self.source.avoid_ids, Utc::now())? {
            ExtractionDecision::Avoid(update) => {
                self.store
                    .update_query(&row.source_url, &row.query_key, &update)
                    .await?;
                reporter.report(RuntimeEvent::QueryAvoided {
                    source,
                    query: &row.query_key,
                });
            }
            ExtractionDecision::Incomplete => {
                return Err(AppError::ExtractionAbort(
                    "missing name, description or view URL".into(),
                ));
            }
            ExtractionDecision::Persist(update) => {
                let update = self.encode_banner(update, &row.query_key).await?;
                self.store
                    .update_query(&row.source_url, &row.query_key, &update)
                    .await?;
                reporter.report(RuntimeEvent::QueryExtracted {
                    source,
                    query: &row.query_key,
                });
            }
        }

        Ok(())
    }

    /// Replace an extracted banner URL with the downloaded image, base64
    /// encoded. A failed download clears the banner.
    async fn encode_banner(
        &self,
        mut update: QueryUpdate,
        query: &str,
    ) -> Result<QueryUpdate, AppError> {
        if !self.source.encode_banners {
            return Ok(update);
        }
        let Some(Some(url)) = update.banner.clone() else {
            return Ok(update);
        };

        update.banner = match self.session.fetch(&url).await {
            Ok(bytes) => Some(Some(
                base64::engine::general_purpose::STANDARD.encode(&bytes),
            )),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    source = %self.source.url,
                    %query,
                    %url,
                    error = %e,
                    "Failed to download banner"
                );
                Some(None)
            }
        };
        Ok(update)
    }

    /// Write a page that never became ready to the diagnostics directory.
    async fn dump_failed_page(&self, html: &str) {
        let path = self.page_fail_path();
        let result = async {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&path, html).await
        }
        .await;

        match result {
            Ok(()) => tracing::debug!(path = %path.display(), "Saved page that failed to load"),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to save page that failed to load"
            ),
        }
    }

    fn page_fail_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%y-%m-%d-%H-%M-%S");
        self.page_fail_dir
            .join(format!("{}-{stamp}.html", self.source.url))
    }
}
