//! Grading period repository for `SQLite` persistence.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::grading_period::GradingPeriod;
use crate::{AppError, Result};

use super::store::{Entity, LocalStore};

/// Repository wrapper around the local store for grading periods.
#[derive(Clone)]
pub struct GradingPeriodRepo {
    store: LocalStore,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct GradingPeriodRow {
    id: String,
    course_id: String,
    title: String,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl GradingPeriodRow {
    fn into_period(self) -> Result<GradingPeriod> {
        Ok(GradingPeriod {
            start_date: parse_optional_date("start_date", self.start_date.as_deref())?,
            end_date: parse_optional_date("end_date", self.end_date.as_deref())?,
            id: self.id,
            course_id: self.course_id,
            title: self.title,
        })
    }
}

fn parse_optional_date(column: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
    })
    .transpose()
}

impl GradingPeriodRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Merge the authoritative grading periods of one course into the cache.
    ///
    /// Periods are stamped with `course_id`; cached periods of that course
    /// that the server no longer returns are deleted. Other courses are not
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement or the commit fails.
    pub async fn reconcile(&self, course_id: &str, periods: &[GradingPeriod]) -> Result<()> {
        let mut tx = self.store.db().begin().await?;

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM grading_period WHERE course_id = ?1")
                .bind(course_id)
                .fetch_all(&mut *tx)
                .await?;

        for period in periods {
            sqlx::query(
                "INSERT INTO grading_period (id, course_id, title, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    course_id = excluded.course_id,
                    title = excluded.title,
                    start_date = excluded.start_date,
                    end_date = excluded.end_date",
            )
            .bind(&period.id)
            .bind(course_id)
            .bind(&period.title)
            .bind(period.start_date.map(|dt| dt.to_rfc3339()))
            .bind(period.end_date.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        let listed: HashSet<&str> = periods.iter().map(|p| p.id.as_str()).collect();
        let stale: Vec<String> = existing
            .into_iter()
            .map(|(id,)| id)
            .filter(|id| !listed.contains(id.as_str()))
            .collect();
        for id in &stale {
            sqlx::query("DELETE FROM grading_period WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let mut changed: Vec<String> = periods.iter().map(|p| p.id.clone()).collect();
        changed.extend(stale);
        self.store.notify(Entity::GradingPeriod, changed);
        Ok(())
    }

    /// Cached grading periods of one course in storage order.
    ///
    /// Display ordering is applied by the caller.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a stored date is corrupt.
    pub async fn list_for_course(&self, course_id: &str) -> Result<Vec<GradingPeriod>> {
        let rows: Vec<GradingPeriodRow> =
            sqlx::query_as("SELECT * FROM grading_period WHERE course_id = ?1 ORDER BY id")
                .bind(course_id)
                .fetch_all(self.store.db())
                .await?;
        rows.into_iter().map(GradingPeriodRow::into_period).collect()
    }
}
