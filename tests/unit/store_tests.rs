use std::sync::Arc;

use lms_sync::persistence::db;
use lms_sync::persistence::store::{Entity, LocalStore, StoreChange};
use tokio::sync::broadcast::error::TryRecvError;

async fn store() -> LocalStore {
    let pool = db::connect_memory().await.expect("db");
    LocalStore::new(Arc::new(pool), 8)
}

#[tokio::test]
async fn notify_fans_out_to_every_subscriber() {
    let store = store().await;
    let mut a = store.subscribe();
    let mut b = store.subscribe();

    store.notify(Entity::Course, vec!["1".into()]);

    let expected = StoreChange {
        entity: Entity::Course,
        ids: vec!["1".into()],
    };
    assert_eq!(a.recv().await.unwrap(), expected);
    assert_eq!(b.recv().await.unwrap(), expected);
}

#[tokio::test]
async fn empty_changes_are_not_published() {
    let store = store().await;
    let mut rx = store.subscribe();

    store.notify(Entity::GradingPeriod, Vec::new());

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn notify_without_subscribers_is_harmless() {
    let store = store().await;
    store.notify(Entity::SubmissionComment, vec!["x".into()]);

    let mut late = store.subscribe();
    assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn file_backed_cache_creates_parent_dirs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("nested").join("cache.db");

    let pool = db::connect(&path).await.expect("file db");
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM course")
        .fetch_one(&pool)
        .await
        .expect("schema applied");

    assert_eq!(count, 0);
    assert!(path.exists());
}
