//! Record lifecycle rules.
//!
//! Pure decisions about what to write for an extracted page and what to do
//! with a parsed row given the catalog's view of it. The pipeline stages
//! perform the I/O around these decisions.

use chrono::{DateTime, Utc};

use crate::catalog::CatalogMatch;
use crate::error::AppError;
use crate::models::{
    DESCRIPTION_SHORT_MAX, Extracted, LinkList, NAME_MAX, OWNER_NAME_MAX, Page, Query,
    QueryUpdate, VIEW_URL_MAX, encode_links,
};
use crate::text::clamp_chars;
use crate::traits::SiteIntegration;

/// Every field extractor's result for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub owner_id: Extracted<String>,
    pub view_url: Extracted<String>,
    pub category_id: Extracted<i64>,
    pub banner: Extracted<String>,
    pub name: Extracted<String>,
    pub owner_name: Extracted<String>,
    pub description: Extracted<String>,
    pub description_short: Extracted<String>,
    pub install: Extracted<String>,
    pub nsfw: Extracted<bool>,
    pub auto_update: Extracted<bool>,
    pub downloads: Extracted<LinkList>,
    pub screenshots: Extracted<LinkList>,
    pub installers: Extracted<LinkList>,
}

impl ExtractedFields {
    pub fn collect(site: &dyn SiteIntegration, page: &Page) -> Self {
        Self {
            owner_id: site.owner_id(page),
            view_url: site.view_url(page),
            category_id: site.category_id(page),
            banner: site.banner(page),
            name: site.name(page),
            owner_name: site.owner_name(page),
            description: site.description(page),
            description_short: site.description_short(page),
            install: site.install(page),
            nsfw: site.nsfw(page),
            auto_update: site.auto_update(page),
            downloads: site.downloads(page),
            screenshots: site.screenshots(page),
            installers: site.installers(page),
        }
    }

    /// The category must be extracted and at least 1.
    pub fn valid_category(&self) -> Result<i64, AppError> {
        match self.category_id {
            Extracted::Value(id) if id >= 1 => Ok(id),
            Extracted::Value(id) => Err(AppError::ExtractionAbort(format!(
                "invalid category id {id}"
            ))),
            _ => Err(AppError::ExtractionAbort("category id not found".into())),
        }
    }

    fn is_avoided(&self, avoid_ids: &[String]) -> bool {
        self.owner_id
            .value()
            .is_some_and(|owner| avoid_ids.iter().any(|id| id == owner))
    }

    /// Text fields are cut to their column limits.
    fn into_update(self) -> Result<QueryUpdate, AppError> {
        fn links(field: Extracted<LinkList>) -> Result<Option<Option<String>>, AppError> {
            match field {
                Extracted::Unset => Ok(None),
                Extracted::Null => Ok(Some(None)),
                Extracted::Value(list) => Ok(Some(Some(encode_links(&list)?))),
            }
        }

        Ok(QueryUpdate {
            view_url: self
                .view_url
                .map(|v| clamp_chars(v, VIEW_URL_MAX))
                .into_column(),
            category_id: self.category_id.into_column(),
            banner: self.banner.into_column(),
            name: self.name.map(|v| clamp_chars(v, NAME_MAX)).into_column(),
            owner_name: self
                .owner_name
                .map(|v| clamp_chars(v, OWNER_NAME_MAX))
                .into_column(),
            description: self.description.into_column(),
            description_short: self
                .description_short
                .map(|v| clamp_chars(v, DESCRIPTION_SHORT_MAX))
                .into_column(),
            install: self.install.into_column(),
            nsfw: self.nsfw.into_column(),
            auto_update: self.auto_update.into_column(),
            downloads: links(self.downloads)?,
            screenshots: links(self.screenshots)?,
            installers: links(self.installers)?,
            ..QueryUpdate::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionDecision {
    /// Owner is on the avoid list: only `allow` and `last_parsed` are written.
    Avoid(QueryUpdate),
    /// Required fields missing after merge; nothing is written.
    Incomplete,
    /// All extracted fields plus `last_parsed` and `needs_updating`.
    Persist(QueryUpdate),
}

/// Decide what to write for `row` given a page's extracted fields.
///
/// The category gate is checked by the caller before the row is looked up.
pub fn reconcile_extraction(
    row: &Query,
    fields: ExtractedFields,
    avoid_ids: &[String],
    now: DateTime<Utc>,
) -> Result<ExtractionDecision, AppError> {
    if fields.is_avoided(avoid_ids) {
        return Ok(ExtractionDecision::Avoid(
            QueryUpdate::new().allow(false).last_parsed(now),
        ));
    }

    let update = fields.into_update()?;

    let mut merged = row.clone();
    update.apply_to(&mut merged);
    if !merged.has_required_fields() {
        return Ok(ExtractionDecision::Incomplete);
    }

    Ok(ExtractionDecision::Persist(
        update.last_parsed(now).needs_updating(true),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    /// The catalog entry opted out of updates: clear `needs_updating`.
    DisableUpdates,
    /// Already in the catalog and updating existing entries is off.
    RecordExisting(Option<i64>),
    /// Not in the catalog and adding new entries is off.
    ForgetModId,
    /// Create (`None`) or update (`Some(id)`).
    Submit(Option<i64>),
}

impl PublishDecision {
    /// The local write for decisions that skip the catalog.
    pub fn skip_update(&self) -> Option<QueryUpdate> {
        match self {
            PublishDecision::DisableUpdates => Some(QueryUpdate::new().needs_updating(false)),
            PublishDecision::RecordExisting(id) => Some(QueryUpdate::new().mod_id(*id)),
            PublishDecision::ForgetModId => Some(QueryUpdate::new().mod_id(None)),
            PublishDecision::Submit(_) => None,
        }
    }
}

pub fn decide_publication(
    found: Option<CatalogMatch>,
    add_existing: bool,
    add_new: bool,
) -> PublishDecision {
    match found {
        Some(m) if !m.auto_update => PublishDecision::DisableUpdates,
        Some(m) if !add_existing => PublishDecision::RecordExisting(m.id),
        Some(m) => PublishDecision::Submit(m.id),
        None if !add_new => PublishDecision::ForgetModId,
        None => PublishDecision::Submit(None),
    }
}

/// Local write after the catalog accepted a submission.
pub fn published_update(mod_id: i64, cleanup_banners: bool) -> QueryUpdate {
    let update = QueryUpdate::new().mod_id(Some(mod_id)).needs_updating(false);
    if cleanup_banners {
        update.clear_banner()
    } else {
        update
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn complete_fields() -> ExtractedFields {
        ExtractedFields {
            view_url: Extracted::Value("rally".into()),
            category_id: Extracted::Value(3),
            name: Extracted::Value("Rally".into()),
            description: Extracted::Value("Fast cars".into()),
            auto_update: Extracted::Value(true),
            ..ExtractedFields::default()
        }
    }

    #[test]
    fn test_category_gate() {
        assert_eq!(complete_fields().valid_category().unwrap(), 3);

        let zero = ExtractedFields {
            category_id: Extracted::Value(0),
            ..complete_fields()
        };
        assert!(matches!(
            zero.valid_category(),
            Err(AppError::ExtractionAbort(_))
        ));

        let missing = ExtractedFields {
            category_id: Extracted::Null,
            ..complete_fields()
        };
        assert!(missing.valid_category().is_err());
        assert!(ExtractedFields::default().valid_category().is_err());
    }

    #[test]
    fn test_avoided_owner_only_writes_allow_and_timestamp() {
        let now = Utc::now();
        let fields = ExtractedFields {
            owner_id: Extracted::Value("666".into()),
            ..complete_fields()
        };
        let row = Query::shell("a.io", "/mod/1");

        let decision = reconcile_extraction(&row, fields, &["666".to_string()], now).unwrap();
        assert_eq!(
            decision,
            ExtractionDecision::Avoid(QueryUpdate {
                allow: Some(false),
                last_parsed: Some(Some(now)),
                ..QueryUpdate::default()
            })
        );
    }

    #[test]
    fn test_owner_not_on_list_persists() {
        let now = Utc::now();
        let fields = ExtractedFields {
            owner_id: Extracted::Value("7".into()),
            ..complete_fields()
        };
        let row = Query::shell("a.io", "/mod/1");

        let ExtractionDecision::Persist(update) =
            reconcile_extraction(&row, fields, &["666".to_string()], now).unwrap()
        else {
            panic!("expected persist");
        };
        assert_eq!(update.last_parsed, Some(Some(now)));
        assert_eq!(update.needs_updating, Some(true));
        assert_eq!(update.name, Some(Some("Rally".into())));
        assert_eq!(update.category_id, Some(Some(3)));
        assert_eq!(update.banner, None);
        assert_eq!(update.allow, None);
    }

    #[test]
    fn test_missing_required_field_is_incomplete() {
        let fields = ExtractedFields {
            description: Extracted::Null,
            ..complete_fields()
        };
        let row = Query::shell("a.io", "/mod/1");
        assert_eq!(
            reconcile_extraction(&row, fields, &[], Utc::now()).unwrap(),
            ExtractionDecision::Incomplete
        );
    }

    #[test]
    fn test_unset_required_field_falls_back_to_stored_value() {
        let mut row = Query::shell("a.io", "/mod/1");
        row.description = Some("Stored".into());
        let fields = ExtractedFields {
            description: Extracted::Unset,
            ..complete_fields()
        };

        let ExtractionDecision::Persist(update) =
            reconcile_extraction(&row, fields, &[], Utc::now()).unwrap()
        else {
            panic!("expected persist");
        };
        assert_eq!(update.description, None);
    }

    #[test]
    fn test_bounded_columns_are_clamped() {
        let fields = ExtractedFields {
            name: Extracted::Value("A".repeat(200)),
            view_url: Extracted::Value("a".repeat(300)),
            owner_name: Extracted::Value("Zeus".repeat(20)),
            description_short: Extracted::Value("x".repeat(400)),
            ..complete_fields()
        };
        let row = Query::shell("a.io", "/mod/1");

        let ExtractionDecision::Persist(update) =
            reconcile_extraction(&row, fields, &[], Utc::now()).unwrap()
        else {
            panic!("expected persist");
        };
        let len = |column: Option<Option<String>>| column.flatten().unwrap().chars().count();
        assert_eq!(len(update.name), NAME_MAX);
        assert_eq!(len(update.view_url), VIEW_URL_MAX);
        assert_eq!(len(update.owner_name), OWNER_NAME_MAX);
        assert_eq!(len(update.description_short), DESCRIPTION_SHORT_MAX);
    }

    #[test]
    fn test_link_lists_are_encoded() {
        let mut link = BTreeMap::new();
        link.insert("url".to_string(), "https://cdn/1.zip".to_string());
        let fields = ExtractedFields {
            downloads: Extracted::Value(vec![link]),
            screenshots: Extracted::Null,
            ..complete_fields()
        };
        let row = Query::shell("a.io", "/mod/1");

        let ExtractionDecision::Persist(update) =
            reconcile_extraction(&row, fields, &[], Utc::now()).unwrap()
        else {
            panic!("expected persist");
        };
        assert_eq!(
            update.downloads,
            Some(Some(r#"[{"url":"https://cdn/1.zip"}]"#.to_string()))
        );
        assert_eq!(update.screenshots, Some(None));
        assert_eq!(update.installers, None);
    }

    #[test]
    fn test_publication_branches() {
        let opted_out = Some(CatalogMatch {
            id: Some(5),
            auto_update: false,
        });
        let updatable = Some(CatalogMatch {
            id: Some(5),
            auto_update: true,
        });

        assert_eq!(
            decide_publication(opted_out, true, true),
            PublishDecision::DisableUpdates
        );
        assert_eq!(
            decide_publication(updatable, false, true),
            PublishDecision::RecordExisting(Some(5))
        );
        assert_eq!(
            decide_publication(updatable, true, false),
            PublishDecision::Submit(Some(5))
        );
        assert_eq!(
            decide_publication(None, true, false),
            PublishDecision::ForgetModId
        );
        assert_eq!(
            decide_publication(None, false, true),
            PublishDecision::Submit(None)
        );
    }

    #[test]
    fn test_skip_updates() {
        assert_eq!(
            PublishDecision::DisableUpdates.skip_update(),
            Some(QueryUpdate::new().needs_updating(false))
        );
        assert_eq!(
            PublishDecision::ForgetModId.skip_update(),
            Some(QueryUpdate {
                mod_id: Some(None),
                ..QueryUpdate::default()
            })
        );
        assert_eq!(PublishDecision::Submit(None).skip_update(), None);
    }

    #[test]
    fn test_published_update_clears_banner_when_asked() {
        let kept = published_update(9, false);
        assert_eq!(kept.mod_id, Some(Some(9)));
        assert_eq!(kept.needs_updating, Some(false));
        assert_eq!(kept.banner, None);

        assert_eq!(published_update(9, true).banner, Some(None));
    }
}
