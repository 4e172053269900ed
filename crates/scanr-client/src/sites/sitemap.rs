use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use scanr_core::models::DESCRIPTION_SHORT_MAX;
use scanr_core::text::{clamp_chars, short_description, slugify};
use scanr_core::{AppError, Extracted, LinkList, Page, SiteIntegration, SourceConfig};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::markdown::MarkdownConverter;

const SHORT_DESCRIPTION_MIN: usize = 20;

/// Options read from a source's `site` object.
///
/// Only `nameSelector` and `descriptionSelector` have defaults; every other
/// selector left out means the field is not extracted at all.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SitemapOptions {
    pub sitemap_path: String,
    /// Substring a sitemap URL must contain to be a candidate, e.g. `/mod/`.
    pub marker: String,
    pub ready_selector: Option<String>,
    pub ready_timeout_secs: u64,
    pub name_selector: String,
    pub description_selector: String,
    pub description_short_selector: Option<String>,
    pub banner_selector: Option<String>,
    pub owner_selector: Option<String>,
    pub install_selector: Option<String>,
    pub download_selector: Option<String>,
    pub screenshot_selector: Option<String>,
    pub installer_selector: Option<String>,
    /// The item is NSFW when this selector matches.
    pub nsfw_selector: Option<String>,
}

impl Default for SitemapOptions {
    fn default() -> Self {
        Self {
            sitemap_path: "/sitemap.xml".to_string(),
            marker: "/mod/".to_string(),
            ready_selector: None,
            ready_timeout_secs: 3,
            name_selector: "h1".to_string(),
            description_selector: "div.markdown".to_string(),
            description_short_selector: None,
            banner_selector: None,
            owner_selector: None,
            install_selector: None,
            download_selector: None,
            screenshot_selector: None,
            installer_selector: None,
            nsfw_selector: None,
        }
    }
}

impl SitemapOptions {
    pub fn from_source(source: &SourceConfig) -> Result<Self, AppError> {
        if source.site.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(source.site.clone()).map_err(|e| {
            AppError::ConfigError(format!("Invalid site options for '{}': {e}", source.url))
        })
    }
}

struct Selectors {
    loc: Selector,
    anchor: Selector,
    image: Selector,
    name: Selector,
    description: Selector,
    description_short: Option<Selector>,
    banner: Option<Selector>,
    owner: Option<Selector>,
    install: Option<Selector>,
    downloads: Option<Selector>,
    screenshots: Option<Selector>,
    installers: Option<Selector>,
    nsfw: Option<Selector>,
}

fn parse_selector(raw: &str) -> Result<Selector, AppError> {
    Selector::parse(raw)
        .map_err(|e| AppError::ConfigError(format!("Invalid selector '{raw}': {e:?}")))
}

fn parse_optional(raw: &Option<String>) -> Result<Option<Selector>, AppError> {
    raw.as_deref().map(parse_selector).transpose()
}

impl Selectors {
    fn compile(options: &SitemapOptions) -> Result<Self, AppError> {
        Ok(Self {
            loc: parse_selector("loc")?,
            anchor: parse_selector("a[href]")?,
            image: parse_selector("img[src]")?,
            name: parse_selector(&options.name_selector)?,
            description: parse_selector(&options.description_selector)?,
            description_short: parse_optional(&options.description_short_selector)?,
            banner: parse_optional(&options.banner_selector)?,
            owner: parse_optional(&options.owner_selector)?,
            install: parse_optional(&options.install_selector)?,
            downloads: parse_optional(&options.download_selector)?,
            screenshots: parse_optional(&options.screenshot_selector)?,
            installers: parse_optional(&options.installer_selector)?,
            nsfw: parse_optional(&options.nsfw_selector)?,
        })
    }
}

/// Config-driven integration for sites that publish a sitemap.
///
/// Discovery keeps every `<loc>` on the source's host whose path contains
/// the marker. The category slug is the path segment right before the
/// marker (`/cars/mod/rally` is `cars`) and is mapped through the source's
/// categories. Everything else comes from CSS selectors.
pub struct SitemapSite {
    label: String,
    host: String,
    source: SourceConfig,
    options: SitemapOptions,
    selectors: Selectors,
    markdown: MarkdownConverter,
}

impl SitemapSite {
    pub fn new(source: &SourceConfig) -> Result<Self, AppError> {
        let options = SitemapOptions::from_source(source)?;
        if options.marker.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Site option 'marker' for '{}' is empty",
                source.url
            )));
        }
        let selectors = Selectors::compile(&options)?;

        Ok(Self {
            label: source.display_name().to_string(),
            host: source.url.to_ascii_lowercase(),
            source: source.clone(),
            options,
            selectors,
            markdown: MarkdownConverter::new(),
        })
    }

    /// [`SiteFactory`](scanr_core::registry::SiteFactory) for the registry.
    pub fn factory(source: &SourceConfig) -> Result<Arc<dyn SiteIntegration>, AppError> {
        Ok(Arc::new(Self::new(source)?))
    }

    /// Query key of a sitemap entry, or `None` when it is off-site or not
    /// a candidate.
    fn key_for(&self, loc: &str) -> Option<String> {
        let key = if loc.starts_with('/') {
            loc.to_string()
        } else {
            let url = Url::parse(loc).ok()?;
            if !url
                .host_str()
                .is_some_and(|h| h.eq_ignore_ascii_case(&self.host))
            {
                return None;
            }
            match url.query() {
                Some(q) => format!("{}?{q}", url.path()),
                None => url.path().to_string(),
            }
        };
        key.contains(&self.options.marker).then_some(key)
    }

    fn category_slug<'a>(&self, query_key: &'a str) -> Option<&'a str> {
        let (prefix, _) = query_key.split_once(&self.options.marker)?;
        prefix.rsplit('/').find(|s| !s.is_empty())
    }

    /// Text of the first match of `selector`, when configured.
    fn first_text(&self, page: &Page, selector: Option<&Selector>) -> Extracted<String> {
        let Some(selector) = selector else {
            return Extracted::Unset;
        };
        let doc = Html::parse_document(&page.html);
        doc.select(selector)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .into()
    }

    fn markdown_of(&self, page: &Page, selector: Option<&Selector>) -> Extracted<String> {
        let Some(selector) = selector else {
            return Extracted::Unset;
        };
        let doc = Html::parse_document(&page.html);
        let Some(el) = doc.select(selector).next() else {
            return Extracted::Null;
        };
        match self.markdown.convert(&el.html()) {
            Ok(md) if !md.is_empty() => Extracted::Value(md),
            Ok(_) => Extracted::Null,
            Err(e) => {
                tracing::warn!(query = %page.query_key, error = %e, "Markdown conversion failed");
                Extracted::Null
            }
        }
    }

    /// Link lists built from every element under `selector`.
    fn links(
        &self,
        page: &Page,
        selector: Option<&Selector>,
        build: impl Fn(ElementRef<'_>, String) -> BTreeMap<String, String>,
        target: &Selector,
        attr: &str,
    ) -> Extracted<LinkList> {
        let Some(selector) = selector else {
            return Extracted::Unset;
        };
        let doc = Html::parse_document(&page.html);
        let list: LinkList = doc
            .select(selector)
            .flat_map(|el| matching_self_or_descendants(el, target))
            .filter_map(|el| {
                let raw = el.value().attr(attr)?;
                Some(build(el, resolve(&page.url, raw)))
            })
            .collect();

        if list.is_empty() {
            Extracted::Null
        } else {
            Extracted::Value(list)
        }
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn matching_self_or_descendants<'a>(el: ElementRef<'a>, target: &Selector) -> Vec<ElementRef<'a>> {
    if target.matches(&el) {
        vec![el]
    } else {
        el.select(target).collect()
    }
}

/// Resolve `raw` against the page URL; unresolvable values pass through.
fn resolve(base: &str, raw: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(raw))
        .map(String::from)
        .unwrap_or_else(|_| raw.to_string())
}

impl SiteIntegration for SitemapSite {
    fn label(&self) -> &str {
        &self.label
    }

    fn listing_path(&self) -> &str {
        &self.options.sitemap_path
    }

    fn candidate_keys(&self, listing: &Page) -> Vec<String> {
        let doc = Html::parse_document(&listing.html);
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        for loc in doc.select(&self.selectors.loc) {
            let raw = element_text(loc);
            match self.key_for(&raw) {
                Some(key) if seen.insert(key.clone()) => keys.push(key),
                Some(_) => {}
                None => tracing::trace!(url = %raw, "Ignoring sitemap entry"),
            }
        }
        keys
    }

    fn ready_selector(&self) -> Option<&str> {
        self.options.ready_selector.as_deref()
    }

    fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.options.ready_timeout_secs)
    }

    fn owner_id(&self, page: &Page) -> Extracted<String> {
        let Some(selector) = &self.selectors.owner else {
            return Extracted::Unset;
        };
        let doc = Html::parse_document(&page.html);
        doc.select(selector)
            .next()
            .and_then(|el| {
                matching_self_or_descendants(el, &self.selectors.anchor)
                    .into_iter()
                    .find_map(|a| a.value().attr("href"))
                    .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            })
            .into()
    }

    fn view_url(&self, page: &Page) -> Extracted<String> {
        self.name(page)
            .map(|name| slugify(&name))
            .value()
            .filter(|slug| !slug.is_empty())
            .cloned()
            .into()
    }

    fn category_id(&self, page: &Page) -> Extracted<i64> {
        self.category_slug(&page.query_key)
            .and_then(|slug| self.source.category_for_slug(slug))
            .into()
    }

    fn banner(&self, page: &Page) -> Extracted<String> {
        let Some(selector) = &self.selectors.banner else {
            return Extracted::Unset;
        };
        let doc = Html::parse_document(&page.html);
        doc.select(selector)
            .flat_map(|el| matching_self_or_descendants(el, &self.selectors.image))
            .find_map(|img| img.value().attr("src"))
            .map(|src| resolve(&page.url, src))
            .into()
    }

    fn name(&self, page: &Page) -> Extracted<String> {
        self.first_text(page, Some(&self.selectors.name))
    }

    fn owner_name(&self, page: &Page) -> Extracted<String> {
        self.first_text(page, self.selectors.owner.as_ref())
    }

    fn description(&self, page: &Page) -> Extracted<String> {
        self.markdown_of(page, Some(&self.selectors.description))
    }

    fn description_short(&self, page: &Page) -> Extracted<String> {
        let selector = self
            .selectors
            .description_short
            .as_ref()
            .unwrap_or(&self.selectors.description);
        match self.first_text(page, Some(selector)) {
            Extracted::Value(text) => short_description(&text, SHORT_DESCRIPTION_MIN)
                .map(|short| clamp_chars(short, DESCRIPTION_SHORT_MAX))
                .into(),
            other => other,
        }
    }

    fn install(&self, page: &Page) -> Extracted<String> {
        self.markdown_of(page, self.selectors.install.as_ref())
    }

    fn nsfw(&self, page: &Page) -> Extracted<bool> {
        match &self.selectors.nsfw {
            Some(selector) => {
                let doc = Html::parse_document(&page.html);
                Extracted::Value(doc.select(selector).next().is_some())
            }
            None => Extracted::Unset,
        }
    }

    fn downloads(&self, page: &Page) -> Extracted<LinkList> {
        self.links(
            page,
            self.selectors.downloads.as_ref(),
            |a, url| {
                BTreeMap::from([
                    ("name".to_string(), element_text(a)),
                    ("url".to_string(), url),
                ])
            },
            &self.selectors.anchor,
            "href",
        )
    }

    fn screenshots(&self, page: &Page) -> Extracted<LinkList> {
        self.links(
            page,
            self.selectors.screenshots.as_ref(),
            |_, url| BTreeMap::from([("url".to_string(), url)]),
            &self.selectors.image,
            "src",
        )
    }

    fn installers(&self, page: &Page) -> Extracted<LinkList> {
        let source_url = self.source.url.clone();
        self.links(
            page,
            self.selectors.installers.as_ref(),
            move |_, url| {
                BTreeMap::from([
                    ("sourceUrl".to_string(), source_url.clone()),
                    ("url".to_string(), url),
                ])
            },
            &self.selectors.anchor,
            "href",
        )
    }
}
