use crate::error::AppError;
use crate::status::{ScraperStatus, StatusCell};
use crate::traits::QueryStore;

/// Table whose size is compared against the ceiling.
pub const QUERY_TABLE: &str = "queries";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityReport {
    pub current_mb: f64,
    pub ceiling_mb: f64,
    pub exceeds: bool,
}

impl CapacityReport {
    /// Strictly above the ceiling exceeds; equal does not.
    pub fn evaluate(current_mb: f64, ceiling_mb: f64) -> Self {
        Self {
            current_mb,
            ceiling_mb,
            exceeds: current_mb > ceiling_mb,
        }
    }
}

/// Compares the query table size against a configured ceiling.
#[derive(Debug, Clone)]
pub struct CapacityMonitor {
    table: String,
    ceiling_mb: f64,
}

impl CapacityMonitor {
    pub fn new(ceiling_mb: f64) -> Self {
        Self {
            table: QUERY_TABLE.to_string(),
            ceiling_mb,
        }
    }

    pub async fn check<S: QueryStore>(&self, store: &S) -> Result<CapacityReport, AppError> {
        let current = store.table_size_mb(&self.table).await?;
        Ok(CapacityReport::evaluate(current, self.ceiling_mb))
    }

    /// Check and apply the result to `status`. A failed check is logged and
    /// leaves the status unchanged.
    pub async fn refresh<S: QueryStore>(
        &self,
        store: &S,
        status: &StatusCell,
        source: &str,
    ) -> Option<(ScraperStatus, ScraperStatus)> {
        match self.check(store).await {
            Ok(report) => {
                tracing::debug!(
                    %source,
                    current_mb = report.current_mb,
                    ceiling_mb = report.ceiling_mb,
                    "Checked query table size"
                );
                status.apply_capacity(report.exceeds)
            }
            Err(e) => {
                tracing::warn!(%source, error = %e, "Failed to read query table size");
                None
            }
        }
    }
}
