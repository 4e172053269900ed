//! Wire types for the remote mod catalog.
//!
//! The catalog speaks JSON envelopes of the form `{"data": ...}`. Lookups
//! return `data` as an array of matches; create/update return `data` as the
//! saved object.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{LinkList, Query, decode_links};

/// Lookup parameters for `GET /api/content/mod`. Absent fields are omitted
/// from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModLookup {
    pub id: Option<i64>,
    pub source_url: Option<String>,
    pub source_query: Option<String>,
}

impl ModLookup {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_source(source_url: impl Into<String>, query_key: impl Into<String>) -> Self {
        Self {
            id: None,
            source_url: Some(source_url.into()),
            source_query: Some(query_key.into()),
        }
    }

    /// Query-string pairs. Fails when every field is empty.
    pub fn query_pairs(&self) -> Result<Vec<(&'static str, String)>, AppError> {
        let mut pairs = Vec::with_capacity(3);
        if let Some(id) = self.id {
            pairs.push(("id", id.to_string()));
        }
        if let Some(url) = &self.source_url {
            pairs.push(("srcUrl", url.clone()));
        }
        if let Some(query) = &self.source_query {
            pairs.push(("srcQuery", query.clone()));
        }
        if pairs.is_empty() {
            return Err(AppError::Generic(
                "Mod lookup needs an id or a source URL/query".into(),
            ));
        }
        Ok(pairs)
    }
}

/// An existing catalog entry matched by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogMatch {
    pub id: Option<i64>,
    /// Missing in the response means `false`.
    pub auto_update: bool,
}

impl CatalogMatch {
    /// Interpret a lookup response body. `Ok(None)` when `data` is empty.
    pub fn from_lookup_body(body: &serde_json::Value) -> Result<Option<Self>, AppError> {
        let data = body.get("data").ok_or_else(|| AppError::RemoteApi {
            status: 200,
            message: "lookup response has no 'data' field".into(),
        })?;

        let first = match data {
            serde_json::Value::Array(items) => items.first(),
            serde_json::Value::Null => None,
            other => Some(other),
        };
        let Some(first) = first else {
            return Ok(None);
        };

        let id = match first.get("id") {
            None | Some(serde_json::Value::Null) => None,
            Some(raw) => Some(json_int(raw).ok_or_else(|| AppError::RemoteApi {
                status: 200,
                message: format!("lookup returned a non-integer id: {raw}"),
            })?),
        };
        let auto_update = first.get("autoUpdate").is_some_and(json_truthy);

        Ok(Some(Self { id, auto_update }))
    }
}

/// Read `data.id` from a create/update response body.
pub fn saved_mod_id(body: &serde_json::Value) -> Result<i64, AppError> {
    let data = body.get("data").ok_or_else(|| AppError::RemoteApi {
        status: 200,
        message: "save response has no 'data' field".into(),
    })?;
    data.get("id")
        .and_then(json_int)
        .ok_or_else(|| AppError::RemoteApi {
            status: 200,
            message: "save response carries no mod id".into(),
        })
}

fn json_int(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Null => false,
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSource {
    pub source_url: String,
    pub query: String,
}

/// Body of a create or update call. `None` fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModPayload {
    /// The catalog's view URL slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nsfw: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<ModSource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LinkList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<LinkList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installers: Option<LinkList>,
}

impl ModPayload {
    /// Build the payload for a stored row, decoding the link-list blobs and
    /// attaching the row's own source reference.
    pub fn from_query(row: &Query) -> Result<Self, AppError> {
        Ok(Self {
            url: row.view_url.clone(),
            banner: row.banner.clone(),
            category_id: row.category_id,
            name: row.name.clone(),
            owner_name: row.owner_name.clone(),
            description: row.description.clone(),
            description_short: row.description_short.clone(),
            install: row.install.clone(),
            nsfw: row.nsfw,
            auto_update: row.auto_update,
            sources: Some(vec![ModSource {
                source_url: row.source_url.clone(),
                query: row.query_key.clone(),
            }]),
            downloads: decode_links(row.downloads.as_deref())?,
            screenshots: decode_links(row.screenshots.as_deref())?,
            installers: decode_links(row.installers.as_deref())?,
        })
    }

    /// A create call needs a name, a view URL and a description.
    pub fn validate_for_create(&self) -> Result<(), AppError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if present(&self.name) && present(&self.url) && present(&self.description) {
            Ok(())
        } else {
            Err(AppError::Generic(
                "Cannot create mod: name, URL or description not set".into(),
            ))
        }
    }
}
