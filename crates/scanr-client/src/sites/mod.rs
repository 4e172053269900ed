//! Built-in site integrations.

mod sitemap;

pub use sitemap::{SitemapOptions, SitemapSite};

use scanr_core::SiteRegistry;

/// Register every built-in integration under its settings name.
pub fn register_builtin(registry: &mut SiteRegistry) -> &mut SiteRegistry {
    registry.register("sitemap", SitemapSite::factory)
}
