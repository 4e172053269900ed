use std::fmt;

use crate::status::ScraperStatus;

/// Pipeline stage of a source runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Discovery,
    Extraction,
    Publication,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Extraction => "extraction",
            Stage::Publication => "publication",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events emitted by a source runtime for monitoring/logging.
#[derive(Debug, Clone)]
pub enum RuntimeEvent<'a> {
    Started {
        source: &'a str,
        site: &'a str,
    },
    StatusChanged {
        source: &'a str,
        from: ScraperStatus,
        to: ScraperStatus,
    },
    CycleSkipped {
        source: &'a str,
        stage: Stage,
        reason: &'a str,
    },
    CycleStarted {
        source: &'a str,
        stage: Stage,
        candidates: usize,
    },
    QueryDiscovered {
        source: &'a str,
        query: &'a str,
    },
    QueryExtracted {
        source: &'a str,
        query: &'a str,
    },
    QueryAvoided {
        source: &'a str,
        query: &'a str,
    },
    QueryPublished {
        source: &'a str,
        query: &'a str,
        mod_id: i64,
        created: bool,
    },
    QuerySkipped {
        source: &'a str,
        stage: Stage,
        query: &'a str,
        reason: &'a str,
    },
    ItemFailed {
        source: &'a str,
        stage: Stage,
        query: &'a str,
        error: &'a str,
    },
    CycleFinished {
        source: &'a str,
        stage: Stage,
        processed: usize,
    },
    CycleAborted {
        source: &'a str,
        stage: Stage,
        error: &'a str,
    },
    Stopped {
        source: &'a str,
    },
}

/// Trait for receiving runtime events (decoupled logging).
pub trait RuntimeReporter: Send + Sync {
    fn report(&self, event: RuntimeEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl RuntimeReporter for TracingReporter {
    fn report(&self, event: RuntimeEvent<'_>) {
        match event {
            RuntimeEvent::Started { source, site } => {
                tracing::info!(%source, %site, "Source runtime started");
            }
            RuntimeEvent::StatusChanged { source, from, to } => {
                if to == ScraperStatus::CapacityExceeded {
                    tracing::error!(%source, %from, %to, "Query table over size limit, pausing stages");
                } else {
                    tracing::warn!(%source, %from, %to, "Query table back under size limit, resuming");
                }
            }
            RuntimeEvent::CycleSkipped {
                source,
                stage,
                reason,
            } => {
                tracing::debug!(%source, %stage, %reason, "Cycle skipped");
            }
            RuntimeEvent::CycleStarted {
                source,
                stage,
                candidates,
            } => {
                tracing::info!(%source, %stage, %candidates, "Cycle started");
            }
            RuntimeEvent::QueryDiscovered { source, query } => {
                tracing::info!(%source, %query, "Added query");
            }
            RuntimeEvent::QueryExtracted { source, query } => {
                tracing::info!(%source, %query, "Parsed query");
            }
            RuntimeEvent::QueryAvoided { source, query } => {
                tracing::warn!(%source, %query, "Owner is on avoid list, disallowing query");
            }
            RuntimeEvent::QueryPublished {
                source,
                query,
                mod_id,
                created,
            } => {
                tracing::info!(%source, %query, %mod_id, %created, "Published mod");
            }
            RuntimeEvent::QuerySkipped {
                source,
                stage,
                query,
                reason,
            } => {
                tracing::debug!(%source, %stage, %query, %reason, "Query skipped");
            }
            RuntimeEvent::ItemFailed {
                source,
                stage,
                query,
                error,
            } => {
                tracing::warn!(%source, %stage, %query, %error, "Query failed");
            }
            RuntimeEvent::CycleFinished {
                source,
                stage,
                processed,
            } => {
                tracing::debug!(%source, %stage, %processed, "Cycle finished");
            }
            RuntimeEvent::CycleAborted {
                source,
                stage,
                error,
            } => {
                tracing::error!(%source, %stage, %error, "Cycle aborted");
            }
            RuntimeEvent::Stopped { source } => {
                tracing::info!(%source, "Source runtime stopped");
            }
        }
    }
}
