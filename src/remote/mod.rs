//! Remote API boundary.
//!
//! The [`RemoteApi`] trait decouples sync logic from the HTTP transport so
//! coordinators and the upload pipeline can run against in-process fakes.
//! Requests are idempotent GETs or single-shot mutations; nothing here
//! retries.

pub mod http;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

use types::{ApiCourse, ApiCustomColors, ApiGradingPeriod, ApiSubmission, PutSubmissionGradeRequest};

/// Boxed future returned by [`RemoteApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Typed request/response contract per LMS endpoint.
pub trait RemoteApi: Send + Sync {
    /// Fetch every course visible to the user, across all pages.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Network`](crate::AppError::Network) on transport
    /// failure or a non-success status.
    fn fetch_courses(&self) -> ApiFuture<'_, Vec<ApiCourse>>;

    /// Fetch the user's custom colors.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Network`](crate::AppError::Network) on failure.
    fn fetch_custom_colors(&self) -> ApiFuture<'_, ApiCustomColors>;

    /// Fetch every grading period of a course, across all pages.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Network`](crate::AppError::Network) on failure.
    fn fetch_grading_periods<'a>(&'a self, course_id: &'a str) -> ApiFuture<'a, Vec<ApiGradingPeriod>>;

    /// Grade and/or comment on a submission.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Network`](crate::AppError::Network) on failure.
    fn put_submission_grade<'a>(
        &'a self,
        request: &'a PutSubmissionGradeRequest,
    ) -> ApiFuture<'a, ApiSubmission>;
}
