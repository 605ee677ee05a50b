//! Grading period records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A grading period belonging to one course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GradingPeriod {
    /// Stable server identifier.
    pub id: String,
    /// Owning course; assigned locally when the period is synced.
    pub course_id: String,
    /// Display title.
    pub title: String,
    /// Period start; unset periods list last.
    pub start_date: Option<DateTime<Utc>>,
    /// Period end.
    pub end_date: Option<DateTime<Utc>>,
}
