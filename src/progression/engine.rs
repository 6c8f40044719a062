//! Progression engine: the orchestrator behind every HTTP operation.
//!
//! Viewing runs the access policies read-only; completing re-runs them,
//! enforces the watch requirement, reserves a pacing slot atomically with
//! the progress write, and then evaluates the completion cascade (badges,
//! certificate, course completion). A completed lesson is terminal: the
//! engine never un-completes.

use chrono::Utc;
use log::{debug, info};
use std::collections::HashSet;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::progression::access::{self, Access};
use crate::progression::badges;
use crate::progression::error::{Denial, ProgressionError};
use crate::progression::pacing;
use crate::progression::store::{CompletionWrite, ProgressionStore};
use crate::progression::types::{
    CompletionResponse, Course, Lesson, LessonView, SchedulingResponse, UnlockStatus,
    VideoProgressRequest, VideoProgressResponse,
};
use crate::progression::video;

pub struct ProgressionEngine<S: ProgressionStore> {
    store: S,
}

impl<S: ProgressionStore> ProgressionEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn lesson_and_course(&self, lesson_id: Uuid) -> Result<(Lesson, Course), ProgressionError> {
        let lesson = self
            .store
            .lesson(lesson_id)?
            .ok_or_else(|| ProgressionError::NotFound(format!("lesson {}", lesson_id)))?;
        let course = self
            .store
            .course(lesson.course_id)?
            .ok_or_else(|| ProgressionError::NotFound(format!("course {}", lesson.course_id)))?;
        Ok((lesson, course))
    }

    fn check_access(
        &self,
        auth: &AuthContext,
        lesson: &Lesson,
        course: &Course,
        lessons: &[Lesson],
        completed: &HashSet<Uuid>,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ProgressionError> {
        let enrollments = match auth.parent_id {
            Some(parent) => self.store.enrollments(parent)?,
            None => Vec::new(),
        };
        match access::evaluate(auth, course, lesson, lessons, completed, &enrollments, now) {
            Access::Allowed => Ok(()),
            Access::Blocked(denial) => Err(denial.into()),
        }
    }

    /// `GET /lessons/{id}` — run every access policy, then return the lesson
    /// with the caller's progress.
    pub async fn lesson_view(
        &self,
        auth: &AuthContext,
        lesson_id: Uuid,
    ) -> Result<LessonView, ProgressionError> {
        let now = Utc::now();
        let (lesson, course) = self.lesson_and_course(lesson_id)?;
        let lessons = self.store.course_lessons(course.id)?;
        let completed = match auth.parent_id {
            Some(parent) => self.store.completed_lessons(parent, course.id)?,
            None => HashSet::new(),
        };
        self.check_access(auth, &lesson, &course, &lessons, &completed, now)?;
        // check_access guarantees an authenticated caller here
        let progress = match auth.parent_id {
            Some(parent) => self.store.progress(parent, lesson.id)?,
            None => None,
        };
        Ok(LessonView::from_parts(&lesson, &course, progress.as_ref()))
    }

    /// `GET /lessons/{id}/unlock-status` — calendar gate only, never an
    /// error; the UI polls this for countdowns without attempting access.
    pub async fn unlock_status(&self, lesson_id: Uuid) -> UnlockStatus {
        let now = Utc::now();
        let lesson = match self.store.lesson(lesson_id) {
            Ok(Some(lesson)) => lesson,
            Ok(None) => {
                return UnlockStatus {
                    unlocked: false,
                    reason: Some("Lesson not found".to_string()),
                    unlock_date: None,
                }
            }
            Err(err) => {
                log::error!("unlock-status lookup failed for {}: {}", lesson_id, err);
                return UnlockStatus {
                    unlocked: false,
                    reason: Some("Lesson unavailable".to_string()),
                    unlock_date: None,
                };
            }
        };
        if access::is_unlocked(&lesson, now) {
            UnlockStatus {
                unlocked: true,
                reason: None,
                unlock_date: None,
            }
        } else {
            UnlockStatus {
                unlocked: false,
                reason: Some(format!("Available from {}", lesson.unlock_date.unwrap_or(now))),
                unlock_date: lesson.unlock_date,
            }
        }
    }

    /// `POST /lessons/{id}/video-progress` — monotone watch-percent report.
    /// A measured `percent` wins over `elapsed_secs`; elapsed-only reports
    /// are estimated against the lesson's expected duration.
    pub async fn record_video_progress(
        &self,
        auth: &AuthContext,
        lesson_id: Uuid,
        report: VideoProgressRequest,
    ) -> Result<VideoProgressResponse, ProgressionError> {
        let parent = auth.parent_id.ok_or(Denial::Unauthenticated)?;
        let lesson = self
            .store
            .lesson(lesson_id)?
            .ok_or_else(|| ProgressionError::NotFound(format!("lesson {}", lesson_id)))?;
        let percent = match (report.percent, report.elapsed_secs) {
            (Some(p), _) => video::clamp_reported_percent(p),
            (None, Some(secs)) => {
                video::estimate_watched_percent(secs, lesson.expected_duration_secs.unwrap_or(0))
            }
            (None, None) => 0,
        };
        let stored = self.store.record_watch_percent(parent, &lesson, percent)?;
        debug!(
            "video progress parent={} lesson={} stored={}%",
            parent, lesson_id, stored
        );
        Ok(VideoProgressResponse {
            video_watched_percent: stored,
        })
    }

    /// `POST /lessons/{id}/video-position` — resume position, plain
    /// overwrite, never gates anything.
    pub async fn record_video_position(
        &self,
        auth: &AuthContext,
        lesson_id: Uuid,
        position_secs: i32,
    ) -> Result<(), ProgressionError> {
        let parent = auth.parent_id.ok_or(Denial::Unauthenticated)?;
        let lesson = self
            .store
            .lesson(lesson_id)?
            .ok_or_else(|| ProgressionError::NotFound(format!("lesson {}", lesson_id)))?;
        self.store
            .record_position(parent, &lesson, position_secs.max(0))?;
        Ok(())
    }

    /// `POST /lessons/{id}/complete` — the completion orchestration.
    pub async fn complete(
        &self,
        auth: &AuthContext,
        lesson_id: Uuid,
    ) -> Result<CompletionResponse, ProgressionError> {
        let now = Utc::now();
        let parent = auth.parent_id.ok_or(Denial::Unauthenticated)?;
        let (lesson, course) = self.lesson_and_course(lesson_id)?;
        let lessons = self.store.course_lessons(course.id)?;
        let completed = self.store.completed_lessons(parent, course.id)?;

        self.check_access(auth, &lesson, &course, &lessons, &completed, now)?;

        if lesson.video_watch_required {
            let stored = self
                .store
                .progress(parent, lesson.id)?
                .map(|p| p.video_watched_percent)
                .unwrap_or(0);
            if !video::meets_watch_requirement(&lesson, stored) {
                return Err(Denial::VideoIncomplete.into());
            }
        }

        let policy = course.pacing_policy();
        let write = self
            .store
            .complete_lesson(parent, &lesson, policy.as_ref(), now)?;

        match write {
            CompletionWrite::Denied(denial) => Err(denial.into()),
            CompletionWrite::AlreadyCompleted => {
                // Completing a completed lesson is a no-op success.
                let course_completed = lessons.iter().all(|l| completed.contains(&l.id));
                Ok(CompletionResponse {
                    awarded_badges: Vec::new(),
                    course_completed,
                    certificate_issued: false,
                })
            }
            CompletionWrite::Completed => {
                let awarded_badges = self.evaluate_badges(parent, now)?;
                let course_completed = lessons
                    .iter()
                    .all(|l| l.id == lesson.id || completed.contains(&l.id));
                let certificate_issued = if course_completed {
                    self.store.issue_certificate(parent, course.id, now)?
                } else {
                    false
                };
                info!(
                    "lesson completed parent={} lesson={} course={} badges={:?} certificate={}",
                    parent, lesson.id, course.slug, awarded_badges, certificate_issued
                );
                Ok(CompletionResponse {
                    awarded_badges,
                    course_completed,
                    certificate_issued,
                })
            }
        }
    }

    fn evaluate_badges(
        &self,
        parent: Uuid,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<String>, ProgressionError> {
        let total = self.store.total_completed(parent)?;
        let dates = self.store.completion_dates(parent)?;
        let streak = badges::current_streak(&dates, now.date_naive());
        let mut awarded = Vec::new();
        for rule in badges::rules() {
            if rule.earned(total, streak) && self.store.award_badge(parent, rule.id, now)? {
                awarded.push(rule.id.to_string());
            }
        }
        Ok(awarded)
    }

    /// `GET /courses/{slug}/scheduling` — current pacing counters for the UI.
    pub async fn scheduling(
        &self,
        auth: &AuthContext,
        slug: &str,
    ) -> Result<SchedulingResponse, ProgressionError> {
        let now = Utc::now();
        let parent = auth.parent_id.ok_or(Denial::Unauthenticated)?;
        let course = self
            .store
            .course_by_slug(slug)?
            .ok_or_else(|| ProgressionError::NotFound(format!("course {}", slug)))?;
        let counts = self.store.pacing_counts(parent, course.id, now)?;
        match course.pacing_policy() {
            None => Ok(SchedulingResponse {
                lessons_today: counts.today,
                max_per_day: None,
                lessons_this_week: counts.this_week,
                max_per_week: None,
                can_access_lesson: true,
                reason: None,
            }),
            Some(policy) => {
                let decision = pacing::evaluate(&policy, counts, now);
                let can_access_lesson = decision.is_reserved();
                let reason = decision.into_denial().map(|d| d.to_string());
                Ok(SchedulingResponse {
                    lessons_today: counts.today,
                    max_per_day: policy.max_per_day,
                    lessons_this_week: counts.this_week,
                    max_per_week: policy.max_per_week,
                    can_access_lesson,
                    reason,
                })
            }
        }
    }
}
