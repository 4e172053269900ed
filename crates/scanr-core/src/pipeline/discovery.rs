use tokio_util::sync::CancellationToken;

use super::Pipeline;
use crate::error::AppError;
use crate::events::{RuntimeEvent, RuntimeReporter, Stage};
use crate::models::Page;
use crate::traits::{BrowserSession, CatalogApi, QueryStore};

impl<S, C, B> Pipeline<S, C, B>
where
    S: QueryStore,
    C: CatalogApi,
    B: BrowserSession,
{
    /// Read the site listing and insert a shell row for every unknown key.
    pub(super) async fn discover<R: RuntimeReporter>(
        &self,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<usize, AppError> {
        let source = self.source.url.as_str();
        let listing_path = self.site.listing_path();
        let listing_url = format!("{}{}", self.source.base_url(), listing_path);

        let load = self
            .session
            .load(
                &listing_url,
                self.site.listing_ready(),
                self.site.ready_timeout(),
            )
            .await?;
        load.ready?;

        let listing = Page {
            url: listing_url,
            query_key: listing_path.to_string(),
            html: load.html,
        };
        let keys = self.site.candidate_keys(&listing);

        reporter.report(RuntimeEvent::CycleStarted {
            source,
            stage: Stage::Discovery,
            candidates: keys.len(),
        });

        let mut processed = 0;
        for key in &keys {
            if cancel.is_cancelled() {
                break;
            }
            processed += 1;

            if let Err(e) = self.discover_one(key, reporter).await {
                self.item_failed(Stage::Discovery, key, e, reporter)?;
            }
        }

        Ok(processed)
    }

    async fn discover_one<R: RuntimeReporter>(&self, key: &str, reporter: &R) -> Result<(), AppError> {
        let source = self.source.url.as_str();

        match self.store.get_query(source, key).await {
            Ok(_) => return Ok(()),
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        match self.store.create_query(source, key).await {
            Ok(_) => {
                reporter.report(RuntimeEvent::QueryDiscovered { source, query: key });
                Ok(())
            }
            // Extraction created it first.
            Err(AppError::DuplicateKey(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
