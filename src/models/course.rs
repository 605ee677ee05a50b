//! Course records and the list view derived from them.

use serde::{Deserialize, Serialize};

/// Color shown for courses without a custom color.
pub const DEFAULT_COURSE_COLOR: &str = "#8B969E";

/// A course as cached in the local store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Course {
    /// Stable server identifier.
    pub id: String,
    /// Course name; some enrollments come back without one.
    pub name: Option<String>,
    /// Short course code, e.g. `BIO 101`.
    pub course_code: Option<String>,
    /// Course card image URL.
    pub image_download_url: Option<String>,
    /// User-chosen color in `#rrggbb` form (local-only, filled from custom colors).
    pub color: Option<String>,
}

/// One row of the all-courses list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CourseSummary {
    /// Course identifier.
    pub course_id: String,
    /// Display title.
    pub title: String,
    /// Course code, empty when unknown.
    pub abbreviation: String,
    /// Display color.
    pub color: String,
    /// Card image, if any.
    pub image_url: Option<String>,
}

impl CourseSummary {
    /// Build a list row from a cached course.
    ///
    /// Returns `None` for courses that cannot be listed: an empty id or no
    /// name.
    #[must_use]
    pub fn from_course(course: &Course) -> Option<Self> {
        let name = course.name.as_ref()?;
        if course.id.is_empty() {
            return None;
        }
        Some(Self {
            course_id: course.id.clone(),
            title: name.clone(),
            abbreviation: course.course_code.clone().unwrap_or_default(),
            color: course
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_COURSE_COLOR.to_owned()),
            image_url: course.image_download_url.clone(),
        })
    }
}
