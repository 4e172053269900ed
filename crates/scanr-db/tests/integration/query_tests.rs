use chrono::{TimeDelta, Utc};
use scanr_core::AppError;
use scanr_core::filter::QueryFilter;
use scanr_core::models::{QueryUpdate, Source};
use scanr_core::traits::{QueryStore, get_or_create_query};
use scanr_db::{QueryRepository, SourceRepository};
use sqlx::PgPool;

use crate::integration::common::setup_test_db;

async fn repo_with_source(pool: PgPool) -> QueryRepository {
    SourceRepository::new(pool.clone())
        .create(&Source::new("a.io", "a.io"))
        .await
        .unwrap();
    QueryRepository::new(pool)
}

#[tokio::test]
async fn create_returns_shell_row() {
    let (pool, _container) = setup_test_db().await;
    let repo = repo_with_source(pool).await;

    let row = repo.create("a.io", "/mod/1").await.unwrap();

    assert_eq!(row.query_key, "/mod/1");
    assert!(row.allow);
    assert!(!row.needs_updating);
    assert!(row.mod_id.is_none());
    assert!(row.last_parsed.is_none());

    let dup = repo.create("a.io", "/mod/1").await;
    assert!(matches!(dup, Err(AppError::DuplicateKey(_))));
}

#[tokio::test]
async fn get_or_create_reuses_existing_row() {
    let (pool, _container) = setup_test_db().await;
    let repo = repo_with_source(pool).await;

    let (_, created) = get_or_create_query(&repo, "a.io", "/mod/1").await.unwrap();
    assert!(created);
    let (_, created) = get_or_create_query(&repo, "a.io", "/mod/1").await.unwrap();
    assert!(!created);
}

#[tokio::test]
async fn update_writes_only_given_columns() {
    let (pool, _container) = setup_test_db().await;
    let repo = repo_with_source(pool).await;
    repo.create("a.io", "/mod/1").await.unwrap();

    let first = QueryUpdate {
        name: Some(Some("Rally".into())),
        banner: Some(Some("https://a.io/b.png".into())),
        ..QueryUpdate::default()
    };
    repo.update("a.io", "/mod/1", &first).await.unwrap();

    let row = repo
        .update(
            "a.io",
            "/mod/1",
            &QueryUpdate::new().mod_id(Some(42)).needs_updating(true).clear_banner(),
        )
        .await
        .unwrap();

    assert_eq!(row.name.as_deref(), Some("Rally"));
    assert_eq!(row.mod_id, Some(42));
    assert!(row.needs_updating);
    assert!(row.banner.is_none());

    let missing = repo
        .update("a.io", "/missing", &QueryUpdate::new().allow(false))
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn find_applies_filter_and_orders_unparsed_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = repo_with_source(pool).await;
    let now = Utc::now();

    for key in ["/mod/1", "/mod/2", "/mod/3", "/mod/4"] {
        repo.create("a.io", key).await.unwrap();
    }
    repo.update(
        "a.io",
        "/mod/1",
        &QueryUpdate::new().last_parsed(now - TimeDelta::hours(2)),
    )
    .await
    .unwrap();
    repo.update(
        "a.io",
        "/mod/2",
        &QueryUpdate::new().last_parsed(now - TimeDelta::hours(5)),
    )
    .await
    .unwrap();
    repo.update("a.io", "/mod/3", &QueryUpdate::new().mod_id(Some(9)))
        .await
        .unwrap();
    repo.update("a.io", "/mod/4", &QueryUpdate::new().allow(false))
        .await
        .unwrap();

    let rows = repo
        .find(
            &QueryFilter::for_source("a.io")
                .allow(true)
                .exists(Some(false))
                .random()
                .limit(10),
        )
        .await
        .unwrap();
    let keys: Vec<_> = rows.iter().map(|r| r.query_key.as_str()).collect();
    assert_eq!(keys, vec!["/mod/2", "/mod/1"]);

    let published = repo
        .find(&QueryFilter::for_source("a.io").exists(Some(true)))
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].query_key, "/mod/3");

    let stale = repo
        .find(&QueryFilter::for_source("a.io").older_than(TimeDelta::hours(3)))
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].query_key, "/mod/2");

    let limited = repo
        .find(&QueryFilter::for_source("a.io").limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn find_by_category_and_required_content() {
    let (pool, _container) = setup_test_db().await;
    let repo = repo_with_source(pool).await;

    repo.create("a.io", "/mod/1").await.unwrap();
    repo.create("a.io", "/mod/2").await.unwrap();
    let full = QueryUpdate {
        name: Some(Some("Rally".into())),
        description: Some(Some("Fast".into())),
        view_url: Some(Some("rally".into())),
        category_id: Some(Some(3)),
        ..QueryUpdate::default()
    };
    repo.update("a.io", "/mod/1", &full).await.unwrap();
    let blank = QueryUpdate {
        name: Some(Some("Other".into())),
        description: Some(Some(String::new())),
        view_url: Some(Some("other".into())),
        category_id: Some(Some(7)),
        ..QueryUpdate::default()
    };
    repo.update("a.io", "/mod/2", &blank).await.unwrap();

    let in_category = repo
        .find(&QueryFilter::for_source("a.io").category_ids(Some(vec![3, 4])))
        .await
        .unwrap();
    assert_eq!(in_category.len(), 1);
    assert_eq!(in_category[0].query_key, "/mod/1");

    let complete = repo
        .find(&QueryFilter::for_source("a.io").require_content())
        .await
        .unwrap();
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].query_key, "/mod/1");

    let none = repo
        .find(&QueryFilter::for_source("a.io").category_ids(Some(Vec::new())))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn delete_removes_row() {
    let (pool, _container) = setup_test_db().await;
    let repo = repo_with_source(pool).await;
    repo.create("a.io", "/mod/1").await.unwrap();

    repo.delete("a.io", "/mod/1").await.unwrap();

    assert!(matches!(repo.get("a.io", "/mod/1").await, Err(AppError::NotFound(_))));
    assert!(matches!(
        repo.delete("a.io", "/mod/1").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn table_size_is_reported_in_megabytes() {
    let (pool, _container) = setup_test_db().await;
    let repo = repo_with_source(pool).await;

    let size = repo.table_size_mb("queries").await.unwrap();
    assert!(size >= 0.0);
    assert!(size < 1.0);
    assert_eq!(repo.table_size_mb("no_such_table").await.unwrap(), 0.0);

    // Through the store trait as the capacity monitor uses it.
    let via_trait = QueryStore::table_size_mb(&repo, "queries").await.unwrap();
    assert!(via_trait < 1.0);
}
