//! Grading periods of one course, ordered by start date.

use std::sync::Arc;

use tracing::debug;

use crate::models::grading_period::GradingPeriod;
use crate::persistence::grading_period_repo::GradingPeriodRepo;
use crate::persistence::store::Entity;
use crate::remote::RemoteApi;
use crate::scheduler::UiScheduler;
use crate::Result;

use super::coordinator::{QueryFuture, SyncSource};
use super::group::GroupOperation;
use super::ordering::sort_by_nullable_key;

/// Operation name of the grading period fetch.
pub const FETCH_GRADING_PERIODS: &str = "grading_periods";

/// Source for a course's grading period picker.
pub struct GradingPeriodsSource {
    course_id: String,
    api: Arc<dyn RemoteApi>,
    periods: GradingPeriodRepo,
    scheduler: UiScheduler,
}

impl GradingPeriodsSource {
    /// Create the source for `course_id`.
    #[must_use]
    pub fn new(
        course_id: &str,
        api: Arc<dyn RemoteApi>,
        periods: GradingPeriodRepo,
        scheduler: UiScheduler,
    ) -> Self {
        Self {
            course_id: course_id.to_owned(),
            api,
            periods,
            scheduler,
        }
    }
}

/// Order periods by start date, undated last, ties by title.
pub fn sort_periods(periods: &mut [GradingPeriod]) {
    sort_by_nullable_key(periods, |p| p.start_date.as_ref(), |p| p.title.as_str());
}

impl SyncSource for GradingPeriodsSource {
    type Item = GradingPeriod;

    fn name(&self) -> &str {
        "grading_periods"
    }

    fn watches(&self) -> &[Entity] {
        &[Entity::GradingPeriod]
    }

    fn query_local(&self) -> QueryFuture<'_, GradingPeriod> {
        Box::pin(async move {
            let mut periods = self.periods.list_for_course(&self.course_id).await?;
            sort_periods(&mut periods);
            Ok(periods)
        })
    }

    fn build_group(&self) -> Result<GroupOperation> {
        let mut group = GroupOperation::new("grading_periods");

        let api = Arc::clone(&self.api);
        let repo = self.periods.clone();
        let scheduler = self.scheduler.clone();
        let course_id = self.course_id.clone();
        group.add_operation(FETCH_GRADING_PERIODS, move || async move {
            let periods: Vec<GradingPeriod> = api
                .fetch_grading_periods(&course_id)
                .await?
                .into_iter()
                .map(|p| p.into_period(&course_id))
                .collect();
            debug!(course_id = %course_id, count = periods.len(), "grading periods fetched");
            scheduler
                .run(async move { repo.reconcile(&course_id, &periods).await })
                .await?
        });

        Ok(group)
    }
}
