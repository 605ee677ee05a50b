//! All-courses list: courses by name with their custom colors.

use std::sync::Arc;

use tracing::debug;

use crate::models::course::{Course, CourseSummary};
use crate::persistence::course_repo::CourseRepo;
use crate::persistence::store::Entity;
use crate::remote::RemoteApi;
use crate::scheduler::UiScheduler;
use crate::Result;

use super::coordinator::{QueryFuture, SyncSource};
use super::group::GroupOperation;

/// Operation name of the course listing fetch.
pub const FETCH_COURSES: &str = "courses";

/// Operation name of the custom color fetch.
pub const FETCH_COLORS: &str = "colors";

/// Source for the all-courses list.
///
/// Sync fetches the course listing, then (once that has finished) the
/// user's custom colors, so colors land on courses that already exist.
pub struct AllCoursesSource {
    api: Arc<dyn RemoteApi>,
    courses: CourseRepo,
    scheduler: UiScheduler,
}

impl AllCoursesSource {
    /// Create the source.
    #[must_use]
    pub fn new(api: Arc<dyn RemoteApi>, courses: CourseRepo, scheduler: UiScheduler) -> Self {
        Self {
            api,
            courses,
            scheduler,
        }
    }
}

impl SyncSource for AllCoursesSource {
    type Item = CourseSummary;

    fn name(&self) -> &str {
        "all_courses"
    }

    fn watches(&self) -> &[Entity] {
        &[Entity::Course]
    }

    fn query_local(&self) -> QueryFuture<'_, CourseSummary> {
        Box::pin(async move {
            let courses = self.courses.list_by_name().await?;
            Ok(courses.iter().filter_map(CourseSummary::from_course).collect())
        })
    }

    fn build_group(&self) -> Result<GroupOperation> {
        let mut group = GroupOperation::new("all_courses");

        let api = Arc::clone(&self.api);
        let repo = self.courses.clone();
        let scheduler = self.scheduler.clone();
        let get_courses = group.add_operation(FETCH_COURSES, move || async move {
            let courses: Vec<Course> = api
                .fetch_courses()
                .await?
                .into_iter()
                .map(Course::from)
                .collect();
            debug!(count = courses.len(), "courses fetched");
            scheduler
                .run(async move { repo.reconcile(&courses).await })
                .await?
        });

        let api = Arc::clone(&self.api);
        let repo = self.courses.clone();
        let scheduler = self.scheduler.clone();
        let get_colors = group.add_operation(FETCH_COLORS, move || async move {
            let colors = api.fetch_custom_colors().await?.course_colors();
            debug!(count = colors.len(), "custom colors fetched");
            scheduler
                .run(async move { repo.apply_colors(&colors).await.map(|_| ()) })
                .await?
        });

        group.add_dependency(get_colors, get_courses)?;
        Ok(group)
    }
}
