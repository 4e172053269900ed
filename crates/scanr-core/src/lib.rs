pub mod capacity;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod status;
pub mod text;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use catalog::{CatalogMatch, ModLookup, ModPayload, ModSource};
pub use config::{Settings, SourceConfig};
pub use error::AppError;
pub use events::{RuntimeEvent, RuntimeReporter, Stage, TracingReporter};
pub use filter::QueryFilter;
pub use models::{Extracted, LinkList, Page, Query, QueryUpdate, Source};
pub use pipeline::{CycleOutcome, Pipeline};
pub use registry::SiteRegistry;
pub use runtime::SourceRuntime;
pub use session::ExclusiveSession;
pub use status::{ScraperStatus, StatusCell};
pub use traits::{BrowserSession, CatalogApi, QueryStore, SiteIntegration};
