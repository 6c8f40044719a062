//! In-memory [`ProgressionStore`] for tests.
//!
//! A single mutex guards all state, which also serializes completion writes
//! the way the Postgres advisory lock does. Seeding helpers enforce the
//! same lesson-ordering integrity the migrations enforce with a unique
//! index.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::progression::access::validate_lesson_ordering;
use crate::progression::pacing::{self, PacingCounts};
use crate::progression::store::{CompletionWrite, ProgressionStore, StoreError};
use crate::progression::types::{Course, Enrollment, Lesson, LessonProgress, PacingPolicy};

#[derive(Default)]
struct Inner {
    courses: HashMap<Uuid, Course>,
    lessons: HashMap<Uuid, Lesson>,
    enrollments: Vec<Enrollment>,
    progress: HashMap<(Uuid, Uuid), LessonProgress>,
    badges: HashSet<(Uuid, String)>,
    certificates: HashSet<(Uuid, Uuid)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_course(&self, course: Course) {
        self.inner.lock().unwrap().courses.insert(course.id, course);
    }

    pub fn add_lesson(&self, lesson: Lesson) {
        let mut inner = self.inner.lock().unwrap();
        let mut siblings: Vec<Lesson> = inner
            .lessons
            .values()
            .filter(|l| l.course_id == lesson.course_id)
            .cloned()
            .collect();
        siblings.push(lesson.clone());
        validate_lesson_ordering(&siblings).expect("duplicate lesson position");
        inner.lessons.insert(lesson.id, lesson);
    }

    pub fn add_enrollment(&self, enrollment: Enrollment) {
        self.inner.lock().unwrap().enrollments.push(enrollment);
    }

    /// Seed a progress row directly, e.g. completions dated in the past.
    pub fn seed_progress(&self, progress: LessonProgress) {
        self.inner
            .lock()
            .unwrap()
            .progress
            .insert((progress.parent_id, progress.lesson_id), progress);
    }

    /// Replace a lesson, keeping its id. Lets tests move an unlock date.
    pub fn update_lesson(&self, lesson: Lesson) {
        self.inner.lock().unwrap().lessons.insert(lesson.id, lesson);
    }

    pub fn certificate_count(&self, parent_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .certificates
            .iter()
            .filter(|(p, _)| *p == parent_id)
            .count()
    }

    fn counts_locked(inner: &Inner, parent_id: Uuid, course_id: Uuid, now: DateTime<Utc>) -> PacingCounts {
        let day_start = pacing::start_of_day(now);
        let week_start = pacing::start_of_week(now);
        let mut counts = PacingCounts::default();
        for p in inner.progress.values() {
            if p.parent_id != parent_id || p.course_id != course_id || !p.completed {
                continue;
            }
            let Some(at) = p.completed_at else { continue };
            if at >= day_start && at <= now {
                counts.today += 1;
            }
            if at >= week_start && at <= now {
                counts.this_week += 1;
            }
        }
        counts
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

impl ProgressionStore for MemoryStore {
    fn course(&self, course_id: Uuid) -> Result<Option<Course>, StoreError> {
        Ok(self.inner.lock().unwrap().courses.get(&course_id).cloned())
    }

    fn course_by_slug(&self, slug: &str) -> Result<Option<Course>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .courses
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    fn lesson(&self, lesson_id: Uuid) -> Result<Option<Lesson>, StoreError> {
        Ok(self.inner.lock().unwrap().lessons.get(&lesson_id).cloned())
    }

    fn course_lessons(&self, course_id: Uuid) -> Result<Vec<Lesson>, StoreError> {
        let mut lessons: Vec<Lesson> = self
            .inner
            .lock()
            .unwrap()
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.position());
        Ok(lessons)
    }

    fn enrollments(&self, parent_id: Uuid) -> Result<Vec<Enrollment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .enrollments
            .iter()
            .filter(|e| e.parent_id == parent_id)
            .cloned()
            .collect())
    }

    fn progress(
        &self,
        parent_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<LessonProgress>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .progress
            .get(&(parent_id, lesson_id))
            .cloned())
    }

    fn completed_lessons(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
    ) -> Result<HashSet<Uuid>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .progress
            .values()
            .filter(|p| p.parent_id == parent_id && p.course_id == course_id && p.completed)
            .map(|p| p.lesson_id)
            .collect())
    }

    fn record_watch_percent(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        percent: i32,
    ) -> Result<i32, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let row = inner
            .progress
            .entry((parent_id, lesson.id))
            .or_insert_with(|| Self::blank_progress(parent_id, lesson, now));
        if percent > row.video_watched_percent {
            row.video_watched_percent = percent;
            row.updated_at = now;
        }
        Ok(row.video_watched_percent)
    }

    fn record_position(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        seconds: i32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let row = inner
            .progress
            .entry((parent_id, lesson.id))
            .or_insert_with(|| Self::blank_progress(parent_id, lesson, now));
        row.video_position_secs = seconds;
        row.updated_at = now;
        Ok(())
    }

    fn pacing_counts(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PacingCounts, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::counts_locked(&inner, parent_id, course_id, now))
    }

    fn complete_lesson(
        &self,
        parent_id: Uuid,
        lesson: &Lesson,
        policy: Option<&PacingPolicy>,
        now: DateTime<Utc>,
    ) -> Result<CompletionWrite, StoreError> {
        // Holding the store lock for the whole check-and-write mirrors the
        // advisory-lock transaction in the Postgres store.
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.progress.get(&(parent_id, lesson.id)) {
            if existing.completed {
                return Ok(CompletionWrite::AlreadyCompleted);
            }
        }
        if let Some(policy) = policy {
            let counts = Self::counts_locked(&inner, parent_id, lesson.course_id, now);
            if let Some(denial) = pacing::evaluate(policy, counts, now).into_denial() {
                return Ok(CompletionWrite::Denied(denial));
            }
        }
        let row = inner
            .progress
            .entry((parent_id, lesson.id))
            .or_insert_with(|| Self::blank_progress(parent_id, lesson, now));
        row.completed = true;
        row.completed_at = Some(now);
        row.updated_at = now;
        Ok(CompletionWrite::Completed)
    }

    fn total_completed(&self, parent_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .progress
            .values()
            .filter(|p| p.parent_id == parent_id && p.completed)
            .count() as i64)
    }

    fn completion_dates(&self, parent_id: Uuid) -> Result<Vec<NaiveDate>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut dates: Vec<NaiveDate> = inner
            .progress
            .values()
            .filter(|p| p.parent_id == parent_id && p.completed)
            .filter_map(|p| p.completed_at)
            .map(|t| t.date_naive())
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();
        Ok(dates)
    }

    fn award_badge(
        &self,
        parent_id: Uuid,
        badge_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .badges
            .insert((parent_id, badge_id.to_string())))
    }

    fn issue_certificate(
        &self,
        parent_id: Uuid,
        course_id: Uuid,
        _now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .certificates
            .insert((parent_id, course_id)))
    }
}
