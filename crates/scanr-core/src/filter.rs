//! Selection options for reading query rows.
//!
//! [`QueryFilter`] is interpreted by every [`QueryStore`](crate::traits::QueryStore)
//! implementation. [`QueryFilter::matches`] is the reference predicate; the
//! PostgreSQL repository renders the same conditions as SQL.

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{Query, non_empty};

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub source_url: Option<String>,
    pub query_key: Option<String>,
    pub needs_updating: Option<bool>,
    pub allow: Option<bool>,
    /// `Some(true)`: published only. `Some(false)`: unpublished only.
    pub exists: Option<bool>,
    /// Only rows whose `last_parsed` is older than `now - older_than`.
    pub older_than: Option<TimeDelta>,
    pub last_parsed_null: Option<bool>,
    pub category_ids: Option<Vec<i64>>,
    pub require_name: bool,
    pub require_description: bool,
    pub require_view_url: bool,
    /// Never-parsed rows first, then oldest `last_parsed`.
    pub order_by_last_parsed: bool,
    /// Random order, applied after `order_by_last_parsed` when both are set.
    pub random_order: bool,
    pub limit: usize,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            source_url: None,
            query_key: None,
            needs_updating: None,
            allow: None,
            exists: None,
            older_than: None,
            last_parsed_null: None,
            category_ids: None,
            require_name: false,
            require_description: false,
            require_view_url: false,
            order_by_last_parsed: true,
            random_order: false,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl QueryFilter {
    pub fn for_source(source_url: impl Into<String>) -> Self {
        Self {
            source_url: Some(source_url.into()),
            ..Self::default()
        }
    }

    pub fn query_key(mut self, key: impl Into<String>) -> Self {
        self.query_key = Some(key.into());
        self
    }

    pub fn needs_updating(mut self, value: bool) -> Self {
        self.needs_updating = Some(value);
        self
    }

    pub fn allow(mut self, value: bool) -> Self {
        self.allow = Some(value);
        self
    }

    pub fn exists(mut self, value: Option<bool>) -> Self {
        self.exists = value;
        self
    }

    pub fn older_than(mut self, age: TimeDelta) -> Self {
        self.older_than = Some(age);
        self
    }

    pub fn last_parsed_null(mut self, value: bool) -> Self {
        self.last_parsed_null = Some(value);
        self
    }

    pub fn category_ids(mut self, ids: Option<Vec<i64>>) -> Self {
        self.category_ids = ids;
        self
    }

    /// Require non-empty name, description and view URL.
    pub fn require_content(mut self) -> Self {
        self.require_name = true;
        self.require_description = true;
        self.require_view_url = true;
        self
    }

    pub fn order_by_last_parsed(mut self, value: bool) -> Self {
        self.order_by_last_parsed = value;
        self
    }

    pub fn random(mut self) -> Self {
        self.random_order = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Row predicate, ignoring ordering and limit.
    pub fn matches(&self, row: &Query, now: DateTime<Utc>) -> bool {
        if self
            .source_url
            .as_deref()
            .is_some_and(|url| url != row.source_url)
        {
            return false;
        }
        if self
            .query_key
            .as_deref()
            .is_some_and(|key| key != row.query_key)
        {
            return false;
        }
        if self.needs_updating.is_some_and(|v| v != row.needs_updating) {
            return false;
        }
        if self.allow.is_some_and(|v| v != row.allow) {
            return false;
        }
        if self.exists.is_some_and(|v| v != row.is_published()) {
            return false;
        }
        if let Some(age) = self.older_than {
            match row.last_parsed {
                Some(at) if at < now - age => {}
                _ => return false,
            }
        }
        if self
            .last_parsed_null
            .is_some_and(|v| v != row.last_parsed.is_none())
        {
            return false;
        }
        if let Some(ids) = &self.category_ids {
            match row.category_id {
                Some(id) if ids.contains(&id) => {}
                _ => return false,
            }
        }
        if self.require_name && !non_empty(&row.name) {
            return false;
        }
        if self.require_description && !non_empty(&row.description) {
            return false;
        }
        if self.require_view_url && !non_empty(&row.view_url) {
            return false;
        }
        true
    }
}

/// Exists filter from a "new items" flag and an "existing items" flag.
///
/// Only the exclusive combinations restrict; both-on and both-off select
/// everything.
pub fn exists_filter(include_new: bool, include_existing: bool) -> Option<bool> {
    match (include_new, include_existing) {
        (true, false) => Some(false),
        (false, true) => Some(true),
        _ => None,
    }
}
