//! The three per-source stages.
//!
//! Each stage runs one cycle at a time: refresh the capacity status, check
//! that the scraper is running and the stage is enabled, then process a
//! batch of items sequentially. Item failures are reported and skipped.
//! Store unavailability ends the cycle early. A session failure is returned
//! to the caller.

mod discovery;
mod extraction;
mod publication;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::capacity::CapacityMonitor;
use crate::config::{IntervalRange, Settings, SourceConfig};
use crate::error::AppError;
use crate::events::{RuntimeEvent, RuntimeReporter, Stage};
use crate::session::ExclusiveSession;
use crate::status::StatusCell;
use crate::traits::{BrowserSession, CatalogApi, QueryStore, SiteIntegration};

/// Result of one stage cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Status was not `Running` or the stage is disabled.
    Skipped,
    /// Items handled, including ones that failed individually.
    Completed { processed: usize },
    /// Ended early on a store error.
    Aborted,
}

/// Everything one source's stages share.
pub struct Pipeline<S, C, B> {
    source: Arc<SourceConfig>,
    api_limit: usize,
    page_fail_dir: PathBuf,
    store: S,
    catalog: C,
    session: ExclusiveSession<B>,
    site: Arc<dyn SiteIntegration>,
    status: StatusCell,
    capacity: CapacityMonitor,
}

impl<S, C, B> Pipeline<S, C, B>
where
    S: QueryStore,
    C: CatalogApi,
    B: BrowserSession,
{
    pub fn new(
        settings: &Settings,
        source: SourceConfig,
        store: S,
        catalog: C,
        session: ExclusiveSession<B>,
        site: Arc<dyn SiteIntegration>,
    ) -> Self {
        Self {
            source: Arc::new(source),
            api_limit: settings.api.limit,
            page_fail_dir: settings.page_fail_dir.clone(),
            store,
            catalog,
            session,
            site,
            status: StatusCell::default(),
            capacity: CapacityMonitor::new(settings.database.size_limit),
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn site(&self) -> &dyn SiteIntegration {
        self.site.as_ref()
    }

    pub fn status(&self) -> &StatusCell {
        &self.status
    }

    pub fn interval(&self, stage: Stage) -> IntervalRange {
        match stage {
            Stage::Discovery => self.source.find_interval(),
            Stage::Extraction => self.source.parse_interval(),
            Stage::Publication => self.source.add_interval(),
        }
    }

    fn stage_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Discovery => self.source.find_enabled,
            Stage::Extraction => self.source.parse_enabled,
            Stage::Publication => self.source.add_enabled,
        }
    }

    /// Run one cycle of `stage`. Only fatal errors are returned.
    pub async fn run_cycle<R: RuntimeReporter>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CycleOutcome, AppError> {
        let source = self.source.url.as_str();

        if let Some((from, to)) = self.capacity.refresh(&self.store, &self.status, source).await {
            reporter.report(RuntimeEvent::StatusChanged { source, from, to });
        }

        if !self.status.is_running() {
            let reason = format!("scraper status is {}", self.status.get());
            reporter.report(RuntimeEvent::CycleSkipped {
                source,
                stage,
                reason: &reason,
            });
            return Ok(CycleOutcome::Skipped);
        }

        if !self.stage_enabled(stage) {
            reporter.report(RuntimeEvent::CycleSkipped {
                source,
                stage,
                reason: "stage disabled",
            });
            return Ok(CycleOutcome::Skipped);
        }

        let result = match stage {
            Stage::Discovery => self.discover(cancel, reporter).await,
            Stage::Extraction => self.extract(cancel, reporter).await,
            Stage::Publication => self.publish(cancel, reporter).await,
        };

        match result {
            Ok(processed) => {
                reporter.report(RuntimeEvent::CycleFinished {
                    source,
                    stage,
                    processed,
                });
                Ok(CycleOutcome::Completed { processed })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let error = e.to_string();
                reporter.report(RuntimeEvent::CycleAborted {
                    source,
                    stage,
                    error: &error,
                });
                Ok(CycleOutcome::Aborted)
            }
        }
    }

    /// Report a failed item. Returns the error back when it must end the cycle.
    fn item_failed<R: RuntimeReporter>(
        &self,
        stage: Stage,
        query: &str,
        error: AppError,
        reporter: &R,
    ) -> Result<(), AppError> {
        if error.aborts_cycle() {
            return Err(error);
        }
        let source = self.source.url.as_str();
        match &error {
            AppError::ExtractionAbort(reason) => reporter.report(RuntimeEvent::QuerySkipped {
                source,
                stage,
                query,
                reason,
            }),
            other => {
                let message = other.to_string();
                reporter.report(RuntimeEvent::ItemFailed {
                    source,
                    stage,
                    query,
                    error: &message,
                });
            }
        }
        Ok(())
    }
}
