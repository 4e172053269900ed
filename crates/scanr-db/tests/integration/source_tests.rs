use scanr_core::AppError;
use scanr_core::models::Source;
use scanr_db::SourceRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn create_and_get_source() {
    let (pool, _container) = setup_test_db().await;
    let repo = SourceRepository::new(pool);

    let created = repo
        .create(&Source::new("bestmods.io", "Best Mods"))
        .await
        .unwrap();
    assert_eq!(created.url, "bestmods.io");

    let fetched = repo.get("bestmods.io").await.unwrap();
    assert_eq!(fetched.name, "Best Mods");

    let all = repo.list(10).await.unwrap();
    assert_eq!(all, vec![created]);
}

#[tokio::test]
async fn missing_and_duplicate_sources_are_classified() {
    let (pool, _container) = setup_test_db().await;
    let repo = SourceRepository::new(pool);

    assert!(matches!(repo.get("nope.io").await, Err(AppError::NotFound(_))));

    repo.create(&Source::new("a.io", "a.io")).await.unwrap();
    let dup = repo.create(&Source::new("a.io", "again")).await;
    assert!(matches!(dup, Err(AppError::DuplicateKey(_))));
}
