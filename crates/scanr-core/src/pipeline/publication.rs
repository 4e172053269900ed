use tokio_util::sync::CancellationToken;

use super::Pipeline;
use crate::catalog::{ModLookup, ModPayload};
use crate::error::AppError;
use crate::events::{RuntimeEvent, RuntimeReporter, Stage};
use crate::filter::{QueryFilter, exists_filter};
use crate::models::Query;
use crate::reconcile::{PublishDecision, decide_publication, published_update};
use crate::text::limit_text;
use crate::traits::{BrowserSession, CatalogApi, QueryStore};

impl<S, C, B> Pipeline<S, C, B>
where
    S: QueryStore,
    C: CatalogApi,
    B: BrowserSession,
{
    /// Selection for one publication cycle.
    pub fn publication_filter(&self) -> QueryFilter {
        QueryFilter::for_source(&self.source.url)
            .needs_updating(true)
            .allow(true)
            .require_content()
            .exists(exists_filter(self.source.add_new, self.source.add_existing))
            .order_by_last_parsed(false)
            .random()
            .limit(self.api_limit)
    }

    pub(super) async fn publish<R: RuntimeReporter>(
        &self,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<usize, AppError> {
        let rows = self.store.find_queries(&self.publication_filter()).await?;

        reporter.report(RuntimeEvent::CycleStarted {
            source: &self.source.url,
            stage: Stage::Publication,
            candidates: rows.len(),
        });

        let mut processed = 0;
        for row in &rows {
            if cancel.is_cancelled() {
                break;
            }
            processed += 1;

            if let Err(e) = self.publish_one(row, reporter).await {
                self.item_failed(Stage::Publication, &row.query_key, e, reporter)?;
            }
        }

        Ok(processed)
    }

    async fn publish_one<R: RuntimeReporter>(&self, row: &Query, reporter: &R) -> Result<(), AppError> {
        let source = self.source.url.as_str();
        let skipped = |reason: &str| {
            reporter.report(RuntimeEvent::QuerySkipped {
                source,
                stage: Stage::Publication,
                query: &row.query_key,
                reason,
            });
        };

        let found = self
            .catalog
            .find_mod(&ModLookup::by_source(&row.source_url, &row.query_key))
            .await?;

        let decision = decide_publication(found, self.source.add_existing, self.source.add_new);
        let id = match decision {
            PublishDecision::Submit(id) => id,
            skip => {
                if let Some(update) = skip.skip_update() {
                    self.store
                        .update_query(&row.source_url, &row.query_key, &update)
                        .await?;
                }
                skipped(match skip {
                    PublishDecision::DisableUpdates => "catalog entry has auto update disabled",
                    PublishDecision::RecordExisting(_) => "already in catalog",
                    _ => "not in catalog and adding new mods is disabled",
                });
                return Ok(());
            }
        };

        if self.source.skip_null_category && !row.has_valid_category() {
            skipped("no valid category id");
            return Ok(());
        }

        let payload = ModPayload::from_query(row)?;

        if self.source.test_mode {
            tracing::info!(
                %source,
                query = %row.query_key,
                ?id,
                name = ?payload.name,
                description = ?payload.description.as_deref().map(|d| limit_text(d, 40)),
                "Test mode, not sending mod to catalog"
            );
            skipped("test mode");
            return Ok(());
        }

        let mod_id = self.catalog.save_mod(id, &payload).await?;

        self.store
            .update_query(
                &row.source_url,
                &row.query_key,
                &published_update(mod_id, self.source.cleanup_banners),
            )
            .await?;

        reporter.report(RuntimeEvent::QueryPublished {
            source,
            query: &row.query_key,
            mod_id,
            created: id.is_none(),
        });
        Ok(())
    }
}
