//! Optimistic file-comment pipeline: placeholder first, upload, grade
//! mutation, atomic swap.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use lms_sync::models::upload::{BatchState, FileUploadContext, UploadFile};
use lms_sync::persistence::comment_repo::CommentRepo;
use lms_sync::sync::comment_upload::{CommentUploader, FileCommentRequest};
use lms_sync::sync::placeholder::{is_placeholder_id, PlaceholderIds};
use lms_sync::AppError;

use super::test_helpers::{eventually, session, FakeApi, FakeUploader, Harness, UploadScript};

struct Fixture {
    harness: Harness,
    api: Arc<FakeApi>,
    uploader: Arc<FakeUploader>,
    repo: CommentRepo,
    pipeline: CommentUploader,
}

async fn fixture(uploader: Arc<FakeUploader>) -> Fixture {
    let harness = Harness::new().await;
    let api = FakeApi::new();
    let repo = CommentRepo::new(harness.store.clone());
    let pipeline = CommentUploader::new(
        api.clone(),
        uploader.clone(),
        repo.clone(),
        harness.scheduler.clone(),
        Arc::new(PlaceholderIds::new()),
    );
    Fixture {
        harness,
        api,
        uploader,
        repo,
        pipeline,
    }
}

fn request(files: &[&str]) -> FileCommentRequest {
    FileCommentRequest {
        course_id: "c1".into(),
        assignment_id: "a1".into(),
        user_id: "42".into(),
        submission_id: "sub-1".into(),
        is_group: false,
        batch_id: "batch-1".into(),
        files: files.iter().map(|f| UploadFile::from_path(*f)).collect(),
    }
}

#[tokio::test]
async fn two_files_end_in_one_confirmed_comment() {
    let fx = fixture(FakeUploader::succeeding(2)).await;
    let session = session();

    let pending = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/a.png", "/tmp/b.pdf"]))
        .await
        .expect("submit");

    let placeholder = pending.placeholder().clone();
    assert!(placeholder.is_placeholder);
    assert!(is_placeholder_id(&placeholder.id));
    assert_eq!(placeholder.author_id, "42");
    assert_eq!(
        fx.repo.get(&placeholder.id).await.unwrap().as_ref(),
        Some(&placeholder),
        "placeholder is stored before submit returns"
    );

    let confirmed = pending.outcome().await.expect("confirmed");

    assert!(!confirmed.is_placeholder);
    assert!(!is_placeholder_id(&confirmed.id));
    assert_eq!(confirmed.attachment_ids, ["f1", "f2"]);
    assert_eq!(confirmed.submission_id, "sub-1");

    let stored = fx.repo.list_for_submission("sub-1").await.unwrap();
    assert_eq!(stored, vec![confirmed]);

    let requests = fx.uploader.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].batch_id, "batch-1");
    assert_eq!(
        requests[0].context,
        FileUploadContext::SubmissionComment {
            course_id: "c1".into(),
            assignment_id: "a1".into(),
        }
    );
    assert_eq!(requests[0].files.len(), 2);

    let puts = fx.api.put_requests.lock().unwrap().clone();
    assert_eq!(puts.len(), 1);
    let comment = puts[0].body.comment.as_ref().expect("comment body");
    assert_eq!(comment.file_ids, ["f1", "f2"]);
    assert!(!comment.group_comment);
    assert_eq!(puts[0].path(), "/api/v1/courses/c1/assignments/a1/submissions/42");
}

#[tokio::test]
async fn no_session_writes_nothing() {
    let fx = fixture(FakeUploader::succeeding(1)).await;

    let result = fx.pipeline.submit(None, request(&["/tmp/a.png"])).await;

    assert!(matches!(result, Err(AppError::Unauthenticated(_))));
    assert_eq!(fx.repo.count().await.unwrap(), 0);
    assert!(fx.uploader.requests.lock().unwrap().is_empty());
    assert_eq!(fx.api.put_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_failure_keeps_placeholder_and_skips_mutation() {
    let uploader = FakeUploader::new(UploadScript::States(vec![
        BatchState::Staged,
        BatchState::Failed {
            error: AppError::Upload("b.pdf: 413 Payload Too Large".into()),
        },
    ]));
    let fx = fixture(uploader).await;
    let session = session();

    let pending = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/b.pdf"]))
        .await
        .unwrap();
    let placeholder_id = pending.placeholder().id.clone();

    let err = pending.outcome().await.expect_err("upload failed");

    assert_eq!(err, AppError::Upload("b.pdf: 413 Payload Too Large".into()));
    assert_eq!(fx.api.put_calls.load(Ordering::SeqCst), 0);
    let kept = fx.repo.get(&placeholder_id).await.unwrap().expect("placeholder kept");
    assert!(kept.is_placeholder);
    assert_eq!(fx.repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_completion_triggers_one_mutation() {
    let completed = BatchState::Completed {
        file_ids: vec!["f1".into()],
    };
    let uploader = FakeUploader::new(UploadScript::States(vec![
        BatchState::Staged,
        completed.clone(),
        completed,
    ]));
    let fx = fixture(uploader).await;
    let session = session();

    let pending = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/a.png"]))
        .await
        .unwrap();
    pending.outcome().await.expect("confirmed");

    assert_eq!(fx.api.put_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn mutation_failure_keeps_placeholder() {
    let fx = fixture(FakeUploader::succeeding(1)).await;
    fx.api.fail_put(AppError::Network(
        "PUT /api/v1/courses/c1/assignments/a1/submissions/42: 500".into(),
    ));
    let session = session();

    let pending = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/a.png"]))
        .await
        .unwrap();
    let placeholder_id = pending.placeholder().id.clone();

    assert!(matches!(pending.outcome().await, Err(AppError::Network(_))));
    assert!(fx.repo.get(&placeholder_id).await.unwrap().is_some());
    assert_eq!(fx.repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn cancel_stops_upload_and_keeps_placeholder() {
    let fx = fixture(FakeUploader::new(UploadScript::Hang)).await;
    let session = session();

    let pending = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/a.png"]))
        .await
        .unwrap();
    let placeholder_id = pending.placeholder().id.clone();

    pending.cancel();
    let result = pending.outcome().await;

    assert!(matches!(result, Err(AppError::Cancelled(_))));
    assert_eq!(fx.api.put_calls.load(Ordering::SeqCst), 0);
    assert!(fx.repo.get(&placeholder_id).await.unwrap().is_some());
}

#[tokio::test]
async fn consecutive_comments_get_distinct_placeholders() {
    let fx = fixture(FakeUploader::new(UploadScript::Hang)).await;
    let session = session();

    let first = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/a.png"]))
        .await
        .unwrap();
    let second = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/b.png"]))
        .await
        .unwrap();

    assert_eq!(first.placeholder().id, "placeholder-1");
    assert_eq!(second.placeholder().id, "placeholder-2");
    assert_eq!(fx.repo.count().await.unwrap(), 2);

    first.cancel();
    second.cancel();
}

#[tokio::test]
async fn orphan_placeholder_survives_the_next_run() {
    let harness = Harness::new().await;
    let api = FakeApi::new();
    let repo = CommentRepo::new(harness.store.clone());
    let session = session();
    let pipeline = |uploader: Arc<FakeUploader>, ids: PlaceholderIds| {
        CommentUploader::new(
            api.clone(),
            uploader,
            repo.clone(),
            harness.scheduler.clone(),
            Arc::new(ids),
        )
    };

    let failing = FakeUploader::new(UploadScript::States(vec![BatchState::Failed {
        error: AppError::Upload("a.png: 500".into()),
    }]));
    let first_run = pipeline(failing, PlaceholderIds::resume(&repo).await.unwrap());
    let orphan = first_run
        .submit(Some(&session), request(&["/tmp/a.png"]))
        .await
        .unwrap();
    let orphan_id = orphan.placeholder().id.clone();
    assert!(orphan.outcome().await.is_err());

    let second_run = pipeline(
        FakeUploader::succeeding(1),
        PlaceholderIds::resume(&repo).await.unwrap(),
    );
    let mut next = request(&["/tmp/b.png"]);
    next.submission_id = "sub-2".into();
    let pending = second_run.submit(Some(&session), next).await.unwrap();

    assert_ne!(pending.placeholder().id, orphan_id);
    pending.outcome().await.expect("confirmed");

    let kept = submission_comment_ids(&repo, "sub-1").await;
    assert_eq!(kept, [orphan_id]);
    assert_eq!(repo.count().await.unwrap(), 2);
}

async fn submission_comment_ids(repo: &CommentRepo, submission_id: &str) -> Vec<String> {
    repo.list_for_submission(submission_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect()
}

#[tokio::test]
async fn placeholder_save_failure_starts_no_upload() {
    let fx = fixture(FakeUploader::succeeding(1)).await;
    sqlx::query("DROP TABLE submission_comment")
        .execute(fx.harness.store.db())
        .await
        .unwrap();
    let session = session();

    let result = fx.pipeline.submit(Some(&session), request(&["/tmp/a.png"])).await;

    assert!(matches!(result, Err(AppError::Db(_))));
    assert!(fx.uploader.requests.lock().unwrap().is_empty());
    assert_eq!(fx.api.put_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_during_mutation_keeps_placeholder() {
    let fx = fixture(FakeUploader::succeeding(1)).await;
    let _gate = fx.api.gate_put();
    let session = session();

    let pending = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/a.png"]))
        .await
        .unwrap();
    let placeholder_id = pending.placeholder().id.clone();
    eventually(|| fx.api.put_calls.load(Ordering::SeqCst) == 1).await;

    pending.cancel();
    let result = pending.outcome().await;

    assert!(matches!(result, Err(AppError::Cancelled(_))));
    assert!(fx.repo.get(&placeholder_id).await.unwrap().is_some());
    assert!(fx.repo.get("comment-1").await.unwrap().is_none());
    assert_eq!(fx.repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn confirmed_save_failure_keeps_placeholder() {
    let fx = fixture(FakeUploader::succeeding(1)).await;
    sqlx::query(
        "CREATE TRIGGER keep_placeholders BEFORE DELETE ON submission_comment
         BEGIN SELECT RAISE(ABORT, 'placeholder rows are locked'); END",
    )
    .execute(fx.harness.store.db())
    .await
    .unwrap();
    let session = session();

    let pending = fx
        .pipeline
        .submit(Some(&session), request(&["/tmp/a.png"]))
        .await
        .unwrap();
    let placeholder_id = pending.placeholder().id.clone();

    let err = pending.outcome().await.expect_err("swap failed");

    assert!(matches!(err, AppError::Db(_)));
    assert_eq!(fx.api.put_calls.load(Ordering::SeqCst), 1);
    assert!(fx.repo.get(&placeholder_id).await.unwrap().is_some());
    assert!(fx.repo.get("comment-1").await.unwrap().is_none());
    assert_eq!(fx.repo.count().await.unwrap(), 1);
}
