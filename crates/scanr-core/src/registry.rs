use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::SourceConfig;
use crate::error::AppError;
use crate::traits::SiteIntegration;

/// Builds a site integration for one configured source.
pub type SiteFactory = fn(&SourceConfig) -> Result<Arc<dyn SiteIntegration>, AppError>;

/// Site integrations available at startup, keyed by the `scraper` name used
/// in the settings file.
#[derive(Default, Clone)]
pub struct SiteRegistry {
    factories: BTreeMap<String, SiteFactory>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: SiteFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the integration named by `source.scraper`.
    pub fn build(&self, source: &SourceConfig) -> Result<Arc<dyn SiteIntegration>, AppError> {
        let name = source.scraper.as_deref().ok_or_else(|| {
            AppError::ConfigError(format!("Source '{}' has no scraper set", source.url))
        })?;
        let factory = self.factories.get(name).ok_or_else(|| {
            AppError::ConfigError(format!("Unknown scraper '{name}' for source '{}'", source.url))
        })?;
        factory(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockSite;

    fn mock_factory(_: &SourceConfig) -> Result<Arc<dyn SiteIntegration>, AppError> {
        Ok(Arc::new(MockSite::new()))
    }

    #[test]
    fn test_build_registered_site() {
        let mut registry = SiteRegistry::new();
        registry.register("mock", mock_factory);

        let source = SourceConfig {
            scraper: Some("mock".into()),
            ..SourceConfig::for_url("a.io")
        };
        let site = registry.build(&source).unwrap();
        assert_eq!(site.label(), "mock");
        assert!(registry.contains("mock"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["mock"]);
    }

    #[test]
    fn test_unknown_or_missing_scraper() {
        let registry = SiteRegistry::new();
        let unknown = SourceConfig {
            scraper: Some("nope".into()),
            ..SourceConfig::for_url("a.io")
        };
        assert!(matches!(
            registry.build(&unknown),
            Err(AppError::ConfigError(_))
        ));
        assert!(registry.build(&SourceConfig::for_url("a.io")).is_err());
    }
}
