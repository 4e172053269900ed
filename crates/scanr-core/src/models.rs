use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One external content site being scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Bare host, e.g. `bestmods.io`. Primary key.
    pub url: String,
    pub name: String,
}

impl Source {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

/// A list of string maps such as `[{"name": "Mirror", "url": "..."}]`.
///
/// Persisted as serialized JSON text in the `downloads`, `screenshots`
/// and `installers` columns.
pub type LinkList = Vec<BTreeMap<String, String>>;

/// Character limits of the bounded `queries` columns.
pub const VIEW_URL_MAX: usize = 256;
pub const NAME_MAX: usize = 120;
pub const OWNER_NAME_MAX: usize = 64;
pub const DESCRIPTION_SHORT_MAX: usize = 256;

/// One discovered content item of a source, keyed by its site-relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub source_url: String,
    /// Site-relative path, always starting with `/`.
    pub query_key: String,
    /// Remote catalog id. `None` and `Some(0)` both mean unpublished.
    pub mod_id: Option<i64>,
    pub last_parsed: Option<DateTime<Utc>>,
    pub allow: bool,
    pub needs_updating: bool,
    pub view_url: Option<String>,
    pub category_id: Option<i64>,
    pub banner: Option<String>,
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub description: Option<String>,
    pub description_short: Option<String>,
    pub install: Option<String>,
    pub nsfw: Option<bool>,
    pub auto_update: Option<bool>,
    pub downloads: Option<String>,
    pub screenshots: Option<String>,
    pub installers: Option<String>,
}

impl Query {
    /// A freshly discovered row with nothing parsed yet.
    pub fn shell(source_url: impl Into<String>, query_key: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            query_key: query_key.into(),
            mod_id: None,
            last_parsed: None,
            allow: true,
            needs_updating: false,
            view_url: None,
            category_id: None,
            banner: None,
            name: None,
            owner_name: None,
            description: None,
            description_short: None,
            install: None,
            nsfw: None,
            auto_update: None,
            downloads: None,
            screenshots: None,
            installers: None,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self.mod_id, Some(id) if id != 0)
    }

    /// Full page URL: `{protocol}://{source_url}{query_key}`.
    pub fn page_url(&self, protocol: &str) -> String {
        format!("{protocol}://{}{}", self.source_url, self.query_key)
    }

    /// Name, description and view URL are all non-empty.
    pub fn has_required_fields(&self) -> bool {
        non_empty(&self.name) && non_empty(&self.description) && non_empty(&self.view_url)
    }

    pub fn has_valid_category(&self) -> bool {
        matches!(self.category_id, Some(id) if id >= 1)
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Decode a persisted link-list blob. A missing or blank blob is `None`.
pub fn decode_links(blob: Option<&str>) -> Result<Option<LinkList>, AppError> {
    match blob {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() || raw.trim() == "null" => Ok(None),
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
    }
}

pub fn encode_links(links: &LinkList) -> Result<String, AppError> {
    Ok(serde_json::to_string(links)?)
}

/// Partial update of a [`Query`] row.
///
/// The outer `Option` says whether the column is written at all; for
/// nullable columns the inner `Option` is the value, so
/// `Some(None)` writes SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryUpdate {
    pub mod_id: Option<Option<i64>>,
    pub last_parsed: Option<Option<DateTime<Utc>>>,
    pub allow: Option<bool>,
    pub needs_updating: Option<bool>,
    pub view_url: Option<Option<String>>,
    pub category_id: Option<Option<i64>>,
    pub banner: Option<Option<String>>,
    pub name: Option<Option<String>>,
    pub owner_name: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub description_short: Option<Option<String>>,
    pub install: Option<Option<String>>,
    pub nsfw: Option<Option<bool>>,
    pub auto_update: Option<Option<bool>>,
    pub downloads: Option<Option<String>>,
    pub screenshots: Option<Option<String>>,
    pub installers: Option<Option<String>>,
}

impl QueryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mod_id(mut self, mod_id: Option<i64>) -> Self {
        self.mod_id = Some(mod_id);
        self
    }

    pub fn last_parsed(mut self, at: DateTime<Utc>) -> Self {
        self.last_parsed = Some(Some(at));
        self
    }

    pub fn allow(mut self, allow: bool) -> Self {
        self.allow = Some(allow);
        self
    }

    pub fn needs_updating(mut self, needs_updating: bool) -> Self {
        self.needs_updating = Some(needs_updating);
        self
    }

    pub fn clear_banner(mut self) -> Self {
        self.banner = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every written column to an in-memory row.
    pub fn apply_to(&self, row: &mut Query) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut row.mod_id, &self.mod_id);
        set(&mut row.last_parsed, &self.last_parsed);
        set(&mut row.allow, &self.allow);
        set(&mut row.needs_updating, &self.needs_updating);
        set(&mut row.view_url, &self.view_url);
        set(&mut row.category_id, &self.category_id);
        set(&mut row.banner, &self.banner);
        set(&mut row.name, &self.name);
        set(&mut row.owner_name, &self.owner_name);
        set(&mut row.description, &self.description);
        set(&mut row.description_short, &self.description_short);
        set(&mut row.install, &self.install);
        set(&mut row.nsfw, &self.nsfw);
        set(&mut row.auto_update, &self.auto_update);
        set(&mut row.downloads, &self.downloads);
        set(&mut row.screenshots, &self.screenshots);
        set(&mut row.installers, &self.installers);
    }
}

/// Result of one site field extractor.
///
/// `Unset` leaves the stored column alone, `Null` clears it, and
/// `Value` overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Extracted<T> {
    #[default]
    Unset,
    Null,
    Value(T),
}

impl<T> Extracted<T> {
    pub fn is_set(&self) -> bool {
        !matches!(self, Extracted::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Extracted::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extracted<U> {
        match self {
            Extracted::Unset => Extracted::Unset,
            Extracted::Null => Extracted::Null,
            Extracted::Value(v) => Extracted::Value(f(v)),
        }
    }

    /// Column write for a [`QueryUpdate`].
    pub fn into_column(self) -> Option<Option<T>> {
        match self {
            Extracted::Unset => None,
            Extracted::Null => Some(None),
            Extracted::Value(v) => Some(Some(v)),
        }
    }
}

impl<T> From<Option<T>> for Extracted<T> {
    /// A completed lookup: found or explicitly empty.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Extracted::Value(v),
            None => Extracted::Null,
        }
    }
}

/// A loaded page handed to site extractors.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub query_key: String,
    pub html: String,
}
