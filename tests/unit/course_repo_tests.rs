use std::collections::HashMap;
use std::sync::Arc;

use lms_sync::models::course::Course;
use lms_sync::persistence::course_repo::CourseRepo;
use lms_sync::persistence::db;
use lms_sync::persistence::store::{Entity, LocalStore};

async fn setup() -> (LocalStore, CourseRepo) {
    let pool = db::connect_memory().await.expect("db");
    let store = LocalStore::new(Arc::new(pool), 16);
    let repo = CourseRepo::new(store.clone());
    (store, repo)
}

fn course(id: &str, name: &str) -> Course {
    Course {
        id: id.into(),
        name: Some(name.into()),
        course_code: Some(format!("C-{id}")),
        image_download_url: None,
        color: None,
    }
}

fn names(courses: &[Course]) -> Vec<String> {
    courses.iter().filter_map(|c| c.name.clone()).collect()
}

#[tokio::test]
async fn reconcile_inserts_and_lists_by_name() {
    let (_store, repo) = setup().await;

    repo.reconcile(&[course("2", "zoology"), course("1", "Algebra"), course("3", "biology")])
        .await
        .expect("reconcile");

    let listed = repo.list_by_name().await.expect("list");
    assert_eq!(names(&listed), ["Algebra", "biology", "zoology"]);
}

#[tokio::test]
async fn reconcile_deletes_courses_missing_from_listing() {
    let (_store, repo) = setup().await;
    repo.reconcile(&[course("1", "A"), course("2", "B")])
        .await
        .expect("first");

    repo.reconcile(&[course("2", "B renamed")]).await.expect("second");

    assert!(repo.get("1").await.expect("get").is_none());
    let kept = repo.get("2").await.expect("get").expect("course 2");
    assert_eq!(kept.name.as_deref(), Some("B renamed"));
}

#[tokio::test]
async fn reconcile_keeps_local_color() {
    let (_store, repo) = setup().await;
    repo.reconcile(&[course("1", "A")]).await.expect("insert");
    repo.apply_colors(&HashMap::from([("1".to_owned(), "#abcdef".to_owned())]))
        .await
        .expect("colors");

    repo.reconcile(&[course("1", "A again")]).await.expect("update");

    let stored = repo.get("1").await.expect("get").expect("course");
    assert_eq!(stored.color.as_deref(), Some("#abcdef"));
    assert_eq!(stored.name.as_deref(), Some("A again"));
}

#[tokio::test]
async fn apply_colors_skips_unknown_courses() {
    let (_store, repo) = setup().await;
    repo.reconcile(&[course("1", "A")]).await.expect("insert");

    let updated = repo
        .apply_colors(&HashMap::from([
            ("1".to_owned(), "#111111".to_owned()),
            ("99".to_owned(), "#999999".to_owned()),
        ]))
        .await
        .expect("colors");

    assert_eq!(updated, 1);
    assert!(repo.get("99").await.expect("get").is_none());
}

#[tokio::test]
async fn reconcile_notifies_once_with_changed_ids() {
    let (store, repo) = setup().await;
    repo.reconcile(&[course("1", "A"), course("2", "B")])
        .await
        .expect("seed");
    let mut rx = store.subscribe();

    repo.reconcile(&[course("2", "B")]).await.expect("reconcile");

    let change = rx.recv().await.expect("change");
    assert_eq!(change.entity, Entity::Course);
    let mut ids = change.ids;
    ids.sort();
    assert_eq!(ids, ["1", "2"]);
    assert!(rx.try_recv().is_err(), "exactly one notification per write");
}

#[tokio::test]
async fn empty_listing_clears_cache() {
    let (_store, repo) = setup().await;
    repo.reconcile(&[course("1", "A")]).await.expect("seed");

    repo.reconcile(&[]).await.expect("clear");

    assert!(repo.list_by_name().await.expect("list").is_empty());
}

#[tokio::test]
async fn list_by_name_folds_non_ascii_case() {
    let (_store, repo) = setup().await;
    repo.reconcile(&[
        course("1", "Ökonomie"),
        course("2", "éthique"),
        course("3", "Économie"),
        course("4", "Zoologie"),
    ])
    .await
    .expect("reconcile");

    let listed = repo.list_by_name().await.expect("list");

    assert_eq!(names(&listed), ["Zoologie", "Économie", "éthique", "Ökonomie"]);
}

#[tokio::test]
async fn list_by_name_breaks_ties_by_id() {
    let (_store, repo) = setup().await;
    repo.reconcile(&[course("b", "art"), course("a", "Art")])
        .await
        .expect("reconcile");

    let ids: Vec<String> = repo
        .list_by_name()
        .await
        .expect("list")
        .into_iter()
        .map(|c| c.id)
        .collect();

    assert_eq!(ids, ["a", "b"]);
}
