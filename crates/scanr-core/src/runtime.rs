use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::events::{RuntimeEvent, RuntimeReporter, Stage};
use crate::models::Source;
use crate::pipeline::Pipeline;
use crate::traits::{BrowserSession, CatalogApi, QueryStore, ensure_source};

/// Runs the three stages of one source concurrently until cancellation or a
/// fatal error.
pub struct SourceRuntime<S, C, B> {
    pipeline: Pipeline<S, C, B>,
}

impl<S, C, B> SourceRuntime<S, C, B>
where
    S: QueryStore,
    C: CatalogApi,
    B: BrowserSession,
{
    pub fn new(pipeline: Pipeline<S, C, B>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline<S, C, B> {
        &self.pipeline
    }

    /// Run until `cancel` fires. Returns an error only when a stage hit a
    /// fatal failure; the other stages are stopped with it.
    pub async fn run<R: RuntimeReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        let config = self.pipeline.source();
        let source = config.url.as_str();

        let record = Source::new(source, config.name.as_deref().unwrap_or(source));
        if let Err(e) = ensure_source(self.pipeline.store(), &record).await {
            tracing::error!(%source, error = %e, "Failed to register source");
        }

        reporter.report(RuntimeEvent::Started {
            source,
            site: self.pipeline.site().label(),
        });

        let result = tokio::try_join!(
            self.stage_loop(Stage::Discovery, &cancel, reporter),
            self.stage_loop(Stage::Extraction, &cancel, reporter),
            self.stage_loop(Stage::Publication, &cancel, reporter),
        );

        reporter.report(RuntimeEvent::Stopped { source });

        result.map(|_| ())
    }

    async fn stage_loop<R: RuntimeReporter>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        let interval = self.pipeline.interval(stage);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.pipeline.run_cycle(stage, cancel, reporter).await?;

            tokio::select! {
                () = tokio::time::sleep(interval.sample()) => {}
                () = cancel.cancelled() => break,
            }
        }

        Ok(())
    }
}
