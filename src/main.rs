#![forbid(unsafe_code)]

//! `lms-sync`: runs one sync cycle against an LMS instance.
//!
//! Loads configuration, opens the local cache, publishes what is cached,
//! reconciles it with the server, and prints the resulting records as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lms_sync::config::GlobalConfig;
use lms_sync::models::upload::UploadFile;
use lms_sync::persistence::comment_repo::CommentRepo;
use lms_sync::persistence::course_repo::CourseRepo;
use lms_sync::persistence::db;
use lms_sync::persistence::grading_period_repo::GradingPeriodRepo;
use lms_sync::persistence::store::LocalStore;
use lms_sync::remote::http::HttpApi;
use lms_sync::remote::RemoteApi;
use lms_sync::scheduler::UiScheduler;
use lms_sync::sync::comment_upload::{CommentUploader, FileCommentRequest};
use lms_sync::sync::coordinator::{SyncCoordinator, SyncSource};
use lms_sync::sync::courses::AllCoursesSource;
use lms_sync::sync::error_sink::{ErrorSink, LogErrorSink};
use lms_sync::sync::grading_periods::GradingPeriodsSource;
use lms_sync::sync::placeholder::PlaceholderIds;
use lms_sync::upload::http::HttpUploader;
use lms_sync::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "lms-sync", about = "Local-first LMS sync client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync and list all courses.
    Courses,
    /// Sync and list the grading periods of a course.
    GradingPeriods {
        /// Course identifier.
        #[arg(long)]
        course_id: String,
    },
    /// Post a comment with attached files on a submission.
    CommentFiles {
        /// Course identifier.
        #[arg(long)]
        course_id: String,
        /// Assignment identifier.
        #[arg(long)]
        assignment_id: String,
        /// Submitting user identifier.
        #[arg(long)]
        user_id: String,
        /// Submission identifier.
        #[arg(long)]
        submission_id: String,
        /// Send the comment to the whole group.
        #[arg(long)]
        group: bool,
        /// Files to attach.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!(base_url = %config.base_url, "configuration loaded");

    // ── Open the local cache ────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    let store = LocalStore::new(db, config.change_buffer);
    info!(path = %config.db_path.display(), "local cache opened");

    let http = HttpApi::from_config(&config)?;
    let api: Arc<dyn RemoteApi> = Arc::new(http.clone());
    let sink: Arc<dyn ErrorSink> = Arc::new(LogErrorSink);

    let ct = CancellationToken::new();
    let (scheduler, scheduler_handle) = UiScheduler::spawn(ct.clone());

    let result = match args.command {
        Command::Courses => {
            let source = AllCoursesSource::new(
                Arc::clone(&api),
                CourseRepo::new(store.clone()),
                scheduler.clone(),
            );
            sync_and_print(SyncCoordinator::new(source, store, scheduler, sink)).await
        }
        Command::GradingPeriods { course_id } => {
            let source = GradingPeriodsSource::new(
                &course_id,
                Arc::clone(&api),
                GradingPeriodRepo::new(store.clone()),
                scheduler.clone(),
            );
            sync_and_print(SyncCoordinator::new(source, store, scheduler, sink)).await
        }
        Command::CommentFiles {
            course_id,
            assignment_id,
            user_id,
            submission_id,
            group,
            files,
        } => {
            let comments = CommentRepo::new(store);
            match PlaceholderIds::resume(&comments).await {
                Ok(ids) => {
                    let pipeline = CommentUploader::new(
                        api,
                        Arc::new(HttpUploader::new(http)),
                        comments,
                        scheduler,
                        Arc::new(ids),
                    );
                    let request = FileCommentRequest {
                        course_id,
                        assignment_id,
                        user_id,
                        submission_id,
                        is_group: group,
                        batch_id: uuid::Uuid::new_v4().to_string(),
                        files: files.into_iter().map(UploadFile::from_path).collect(),
                    };
                    post_comment(&pipeline, config.session().as_ref(), request).await
                }
                Err(err) => Err(err),
            }
        }
    };

    ct.cancel();
    let _ = scheduler_handle.await;
    result
}

async fn sync_and_print<S>(coordinator: SyncCoordinator<S>) -> Result<()>
where
    S: SyncSource,
    S::Item: Serialize,
{
    coordinator.load_data().await?;
    let snapshot = coordinator.settled().await;
    coordinator.shutdown();
    info!(count = snapshot.items.len(), "sync settled");
    print_json(&snapshot.items)
}

async fn post_comment(
    pipeline: &CommentUploader,
    session: Option<&lms_sync::models::session::LoginSession>,
    request: FileCommentRequest,
) -> Result<()> {
    let pending = pipeline.submit(session, request).await?;
    info!(placeholder_id = %pending.placeholder().id, "comment queued");

    let cancel = pending.cancellation_token();
    let outcome = tokio::select! {
        () = shutdown_signal() => {
            warn!("interrupted; cancelling upload");
            cancel.cancel();
            return Err(AppError::Cancelled("interrupted".into()));
        }
        outcome = pending.outcome() => outcome,
    };

    print_json(&outcome?)
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
