//! Storage layer for the progression engine.
//!
//! [`ProgressionStore`] is the seam between the engine's decision logic and
//! durable state. The Postgres implementation backs production; tests run
//! the same engine against the in-memory store in
//! [`crate::progression::testing`]. Both route pacing decisions through
//! [`crate::progression::pacing::evaluate`], so the cap logic is written
//! once.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sql_types::{Integer, Text};
use std::collections::HashSet;
use uuid::Uuid;

use crate::progression::error::Denial;
use crate::progression::pacing::{self, PacingCounts};
use crate::progression::types::{
    badge_awards, certificates, courses, enrollments, lesson_progress, lessons, BadgeAward,
    Certificate, Course, Enrollment, Lesson, LessonProgress, PacingPolicy,
};
use crate::shared::utils::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Data integrity violation: {0}")]
    Integrity(String),
}

/// Result of the atomic completion write.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionWrite {
    /// Progress row now marks the lesson completed.
    Completed,
    /// The lesson was already completed; nothing changed.
    AlreadyCompleted,
    /// A pacing cap blocked the completion. No write happened.
    Denied(Denial),
}

pub trait ProgressionStore: Send + Sync {
    fn course(&self, course_id: Uuid) -> Result<Option<Course>, StoreError>;
    fn course_by_slug(&self, slug: &str) -> Result<Option<Course>, StoreError>;
    fn lesson(&self, lesson_id: Uuid) -> Result<Option<Lesson>, StoreError>;
    /// Lessons of a course in `(module_number, lesson_order)` order.
    fn course_lessons(&self, course_id: Uuid) -> Result<Vec<Lesson>, StoreError>;
    fn enrollments(&self, parent_id: Uuid) -> Result<Vec<Enrollment>, StoreError>;
    fn progress(&self, parent_id: Uuid, lesson_id: Uuid)
        -> Result<Option<LessonProgress>, StoreError>;
    /// Ids of the parent's completed lessons within a course.
    fn completed_lessons(&self, parent_id: Uuid, course_id: Uuid)
        -> Result<HashSet<Uuid>, StoreError>;
    /// Monotonic watch-percent write; returns the stored value, which never
    /// decreases. Creates the progress row lazily.
    fn record_watch_percent(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        percent: i32,
    ) -> Result<i32, StoreError>;
    /// Unconditional resume-position overwrite. Creates the row lazily.
    fn record_position(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        seconds: i32,
    ) -> Result<(), StoreError>;
    /// Day/week completion counts for display; not a reservation.
    fn pacing_counts(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PacingCounts, StoreError>;
    /// Atomically reserve a pacing slot (when a policy applies) and mark the
    /// lesson completed. Counting and writing share one transaction,
    /// serialized per (parent, course), so concurrent completions cannot
    /// jointly exceed a cap.
    fn complete_lesson(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        policy: Option<&PacingPolicy>,
        now: DateTime<Utc>,
    ) -> Result<CompletionWrite, StoreError>;
    /// Lessons completed by the parent across all courses.
    fn total_completed(&self, parent_id: Uuid) -> Result<i64, StoreError>;
    /// Distinct UTC dates with at least one completion, newest first.
    fn completion_dates(&self, parent_id: Uuid) -> Result<Vec<NaiveDate>, StoreError>;
    /// Award a badge at most once; `true` when a new row was inserted.
    fn award_badge(
        &self,
        parent_id: Uuid,
        badge_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    /// Issue a course certificate at most once; `true` when newly issued.
    fn issue_certificate(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

// ============================================================================
// POSTGRES IMPLEMENTATION
// ============================================================================

pub struct DieselStore {
    pool: DbPool,
}

impl DieselStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    fn counts_in_tx(
        conn: &mut PgConnection,
        parent_id: Uuid,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PacingCounts, StoreError> {
        let today: i64 = lesson_progress::table
            .filter(lesson_progress::parent_id.eq(parent_id))
            .filter(lesson_progress::course_id.eq(course_id))
            .filter(lesson_progress::completed.eq(true))
            .filter(lesson_progress::completed_at.ge(pacing::start_of_day(now)))
            .filter(lesson_progress::completed_at.le(now))
            .count()
            .get_result(conn)?;
        let this_week: i64 = lesson_progress::table
            .filter(lesson_progress::parent_id.eq(parent_id))
            .filter(lesson_progress::course_id.eq(course_id))
            .filter(lesson_progress::completed.eq(true))
            .filter(lesson_progress::completed_at.ge(pacing::start_of_week(now)))
            .filter(lesson_progress::completed_at.le(now))
            .count()
            .get_result(conn)?;
        Ok(PacingCounts { today, this_week })
    }

    fn blank_progress(parent_id: Uuid, lesson: &Lesson, now: DateTime<Utc>) -> LessonProgress {
        LessonProgress {
            id: Uuid::new_v4(),
            parent_id,
            lesson_id: lesson.id,
            course_id: lesson.course_id,
            completed: false,
            completed_at: None,
            video_watched_percent: 0,
            video_position_secs: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ProgressionStore for DieselStore {
    fn course(&self, course_id: Uuid) -> Result<Option<Course>, StoreError> {
        let mut conn = self.conn()?;
        courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn course_by_slug(&self, slug: &str) -> Result<Option<Course>, StoreError> {
        let mut conn = self.conn()?;
        courses::table
            .filter(courses::slug.eq(slug))
            .first::<Course>(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn lesson(&self, lesson_id: Uuid) -> Result<Option<Lesson>, StoreError> {
        let mut conn = self.conn()?;
        lessons::table
            .filter(lessons::id.eq(lesson_id))
            .first::<Lesson>(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn course_lessons(&self, course_id: Uuid) -> Result<Vec<Lesson>, StoreError> {
        let mut conn = self.conn()?;
        lessons::table
            .filter(lessons::course_id.eq(course_id))
            .order((lessons::module_number.asc(), lessons::lesson_order.asc()))
            .load::<Lesson>(&mut conn)
            .map_err(Into::into)
    }

    fn enrollments(&self, parent_id: Uuid) -> Result<Vec<Enrollment>, StoreError> {
        let mut conn = self.conn()?;
        enrollments::table
            .filter(enrollments::parent_id.eq(parent_id))
            .load::<Enrollment>(&mut conn)
            .map_err(Into::into)
    }

    fn progress(
        &self,
        parent_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<LessonProgress>, StoreError> {
        let mut conn = self.conn()?;
        lesson_progress::table
            .filter(lesson_progress::parent_id.eq(parent_id))
            .filter(lesson_progress::lesson_id.eq(lesson_id))
            .first::<LessonProgress>(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    fn completed_lessons(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
    ) -> Result<HashSet<Uuid>, StoreError> {
        let mut conn = self.conn()?;
        let ids: Vec<Uuid> = lesson_progress::table
            .filter(lesson_progress::parent_id.eq(parent_id))
            .filter(lesson_progress::course_id.eq(course_id))
            .filter(lesson_progress::completed.eq(true))
            .select(lesson_progress::lesson_id)
            .load(&mut conn)?;
        Ok(ids.into_iter().collect())
    }

    fn record_watch_percent(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        percent: i32,
    ) -> Result<i32, StoreError> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let mut row = Self::blank_progress(parent_id, lesson, now);
        row.video_watched_percent = percent;
        // GREATEST keeps the stored value monotone even under concurrent
        // reports arriving out of order.
        diesel::insert_into(lesson_progress::table)
            .values(&row)
            .on_conflict((lesson_progress::parent_id, lesson_progress::lesson_id))
            .do_update()
            .set((
                lesson_progress::video_watched_percent.eq(diesel::dsl::sql::<Integer>(
                    "GREATEST(lesson_progress.video_watched_percent, ",
                )
                .bind::<Integer, _>(percent)
                .sql(")")),
                lesson_progress::updated_at.eq(now),
            ))
            .returning(lesson_progress::video_watched_percent)
            .get_result::<i32>(&mut conn)
            .map_err(Into::into)
    }

    fn record_position(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        seconds: i32,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let mut row = Self::blank_progress(parent_id, lesson, now);
        row.video_position_secs = seconds;
        diesel::insert_into(lesson_progress::table)
            .values(&row)
            .on_conflict((lesson_progress::parent_id, lesson_progress::lesson_id))
            .do_update()
            .set((
                lesson_progress::video_position_secs.eq(seconds),
                lesson_progress::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn pacing_counts(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PacingCounts, StoreError> {
        let mut conn = self.conn()?;
        Self::counts_in_tx(&mut conn, parent_id, course_id, now)
    }

    fn complete_lesson(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        policy: Option<&PacingPolicy>,
        now: DateTime<Utc>,
    ) -> Result<CompletionWrite, StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<CompletionWrite, StoreError, _>(|conn| {
            // Serialize competing completions for this (parent, course);
            // released automatically at transaction end.
            diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
                .bind::<Text, _>(parent_id.to_string())
                .bind::<Text, _>(lesson.course_id.to_string())
                .execute(conn)?;

            let existing: Option<LessonProgress> = lesson_progress::table
                .filter(lesson_progress::parent_id.eq(parent_id))
                .filter(lesson_progress::lesson_id.eq(lesson.id))
                .first(conn)
                .optional()?;
            if existing.as_ref().map(|p| p.completed).unwrap_or(false) {
                return Ok(CompletionWrite::AlreadyCompleted);
            }

            if let Some(policy) = policy {
                let counts = Self::counts_in_tx(conn, parent_id, lesson.course_id, now)?;
                if let Some(denial) = pacing::evaluate(policy, counts, now).into_denial() {
                    return Ok(CompletionWrite::Denied(denial));
                }
            }

            let mut row = Self::blank_progress(parent_id, lesson, now);
            row.completed = true;
            row.completed_at = Some(now);
            diesel::insert_into(lesson_progress::table)
                .values(&row)
                .on_conflict((lesson_progress::parent_id, lesson_progress::lesson_id))
                .do_update()
                .set((
                    lesson_progress::completed.eq(true),
                    lesson_progress::completed_at.eq(Some(now)),
                    lesson_progress::updated_at.eq(now),
                ))
                .execute(conn)?;
            Ok(CompletionWrite::Completed)
        })
    }

    fn total_completed(&self, parent_id: Uuid) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        lesson_progress::table
            .filter(lesson_progress::parent_id.eq(parent_id))
            .filter(lesson_progress::completed.eq(true))
            .count()
            .get_result(&mut conn)
            .map_err(Into::into)
    }

    fn completion_dates(&self, parent_id: Uuid) -> Result<Vec<NaiveDate>, StoreError> {
        let mut conn = self.conn()?;
        let stamps: Vec<Option<DateTime<Utc>>> = lesson_progress::table
            .filter(lesson_progress::parent_id.eq(parent_id))
            .filter(lesson_progress::completed.eq(true))
            .select(lesson_progress::completed_at)
            .order(lesson_progress::completed_at.desc())
            .load(&mut conn)?;
        let mut dates: Vec<NaiveDate> = stamps
            .into_iter()
            .flatten()
            .map(|t| t.date_naive())
            .collect();
        dates.dedup();
        Ok(dates)
    }

    fn award_badge(
        &self,
        parent_id: Uuid,
        badge_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let award = BadgeAward {
            id: Uuid::new_v4(),
            parent_id,
            badge_id: badge_id.to_string(),
            awarded_at: now,
        };
        let inserted = diesel::insert_into(badge_awards::table)
            .values(&award)
            .on_conflict((badge_awards::parent_id, badge_awards::badge_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    fn issue_certificate(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let verification_code = format!(
            "LS-{}-{}",
            now.format("%Y%m%d"),
            &Uuid::new_v4().to_string()[..8].to_uppercase()
        );
        let certificate = Certificate {
            id: Uuid::new_v4(),
            parent_id,
            course_id,
            issued_at: now,
            verification_code,
        };
        let inserted = diesel::insert_into(certificates::table)
            .values(&certificate)
            .on_conflict((certificates::parent_id, certificates::course_id))
            .do_nothing()
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }
}
