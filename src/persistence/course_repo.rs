//! Course repository for `SQLite` persistence.

use std::collections::{HashMap, HashSet};

use crate::models::course::Course;
use crate::sync::ordering::compare_titles;
use crate::Result;

use super::store::{Entity, LocalStore};

/// Repository wrapper around the local store for course records.
#[derive(Clone)]
pub struct CourseRepo {
    store: LocalStore,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CourseRow {
    id: String,
    name: Option<String>,
    course_code: Option<String>,
    image_download_url: Option<String>,
    color: Option<String>,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            course_code: row.course_code,
            image_download_url: row.image_download_url,
            color: row.color,
        }
    }
}

impl CourseRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Merge an authoritative course listing into the cache.
    ///
    /// Every listed course is inserted or updated, keeping its local color.
    /// Cached courses missing from the listing are deleted. Runs in one
    /// transaction and publishes a single change on commit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement or the commit fails; nothing
    /// is written in that case.
    pub async fn reconcile(&self, courses: &[Course]) -> Result<()> {
        let mut tx = self.store.db().begin().await?;

        let existing: Vec<(String,)> = sqlx::query_as("SELECT id FROM course")
            .fetch_all(&mut *tx)
            .await?;

        for course in courses {
            sqlx::query(
                "INSERT INTO course (id, name, course_code, image_download_url, color)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    course_code = excluded.course_code,
                    image_download_url = excluded.image_download_url",
            )
            .bind(&course.id)
            .bind(&course.name)
            .bind(&course.course_code)
            .bind(&course.image_download_url)
            .bind(&course.color)
            .execute(&mut *tx)
            .await?;
        }

        let listed: HashSet<&str> = courses.iter().map(|c| c.id.as_str()).collect();
        let stale: Vec<String> = existing
            .into_iter()
            .map(|(id,)| id)
            .filter(|id| !listed.contains(id.as_str()))
            .collect();
        for id in &stale {
            sqlx::query("DELETE FROM course WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let mut changed: Vec<String> = courses.iter().map(|c| c.id.clone()).collect();
        changed.extend(stale);
        self.store.notify(Entity::Course, changed);
        Ok(())
    }

    /// Store custom colors keyed by course id. Unknown courses are skipped.
    ///
    /// Returns the number of courses updated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if an update or the commit fails.
    pub async fn apply_colors(&self, colors: &HashMap<String, String>) -> Result<usize> {
        let mut tx = self.store.db().begin().await?;
        let mut updated = Vec::new();

        for (course_id, color) in colors {
            let result = sqlx::query("UPDATE course SET color = ?1 WHERE id = ?2")
                .bind(color)
                .bind(course_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() > 0 {
                updated.push(course_id.clone());
            }
        }

        tx.commit().await?;

        let count = updated.len();
        self.store.notify(Entity::Course, updated);
        Ok(count)
    }

    /// Retrieve a course by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, id: &str) -> Result<Option<Course>> {
        let row: Option<CourseRow> = sqlx::query_as("SELECT * FROM course WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.store.db())
            .await?;
        Ok(row.map(Course::from))
    }

    /// All cached courses ordered by name (case-insensitive), then id.
    /// Unnamed courses come first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_name(&self) -> Result<Vec<Course>> {
        let rows: Vec<CourseRow> = sqlx::query_as("SELECT * FROM course")
            .fetch_all(self.store.db())
            .await?;
        let mut courses: Vec<Course> = rows.into_iter().map(Course::from).collect();
        // SQLite's NOCASE folds ASCII only.
        courses.sort_by(|a, b| {
            compare_titles(
                a.name.as_deref().unwrap_or_default(),
                b.name.as_deref().unwrap_or_default(),
            )
            .then_with(|| a.id.cmp(&b.id))
        });
        Ok(courses)
    }
}
