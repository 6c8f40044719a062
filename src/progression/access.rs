//! AccessEvaluator: decides whether a parent may open a lesson.
//!
//! Checks run in a fixed order so the learner always sees the most
//! actionable reason first: authentication, then payment access, then the
//! prerequisite chain, then the schedule lock. Pure read over data the
//! caller already loaded.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::progression::error::Denial;
use crate::progression::store::StoreError;
use crate::progression::types::{Course, Enrollment, Lesson};

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Allowed,
    Blocked(Denial),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Evaluate all access policies for `lesson`. `lessons` is the course's
/// lesson list in total order and must contain `lesson`; `completed` holds
/// the ids of lessons this parent has completed in the course.
pub fn evaluate(
    auth: &AuthContext,
    course: &Course,
    lesson: &Lesson,
    lessons: &[Lesson],
    completed: &HashSet<Uuid>,
    enrollments: &[Enrollment],
    now: DateTime<Utc>,
) -> Access {
    if !auth.is_authenticated() {
        return Access::Blocked(Denial::Unauthenticated);
    }

    if !has_payment_access(auth, course, enrollments, now) {
        return Access::Blocked(Denial::AccessDenied {
            course_slug: course.slug.clone(),
        });
    }

    if let Some(previous) = previous_lesson(lessons, lesson) {
        if !completed.contains(&previous.id) {
            return Access::Blocked(Denial::PrerequisiteIncomplete {
                previous_lesson_id: previous.id,
                previous_lesson_title: previous.title.clone(),
                course_slug: course.slug.clone(),
            });
        }
    }

    if !is_unlocked(lesson, now) {
        // unlock_date is present whenever is_unlocked is false
        if let Some(unlock_date) = lesson.unlock_date {
            return Access::Blocked(Denial::ScheduleLocked {
                unlock_date,
                course_slug: course.slug.clone(),
            });
        }
    }

    Access::Allowed
}

fn has_payment_access(
    auth: &AuthContext,
    course: &Course,
    enrollments: &[Enrollment],
    now: DateTime<Utc>,
) -> bool {
    if course.is_free || auth.admin {
        return true;
    }
    enrollments.iter().any(|e| {
        e.is_active_at(now)
            && (e.course_id == Some(course.id) || (e.is_all_access() && course.is_live))
    })
}

// ----- PrerequisiteChecker -----

/// Immediate predecessor of `lesson` in the `(module_number, lesson_order)`
/// total order, or `None` for the first lesson of the course.
pub fn previous_lesson<'a>(lessons: &'a [Lesson], lesson: &Lesson) -> Option<&'a Lesson> {
    lessons
        .iter()
        .filter(|l| l.id != lesson.id && l.position() < lesson.position())
        .max_by_key(|l| l.position())
}

/// Duplicate position keys within a course break the total order and are
/// rejected when lessons are ingested, not tolerated at query time.
pub fn validate_lesson_ordering(lessons: &[Lesson]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for lesson in lessons {
        if !seen.insert((lesson.course_id, lesson.position())) {
            return Err(StoreError::Integrity(format!(
                "duplicate lesson position {:?} in course {}",
                lesson.position(),
                lesson.course_id
            )));
        }
    }
    Ok(())
}

// ----- ScheduleUnlockCalculator -----

pub fn is_unlocked(lesson: &Lesson, now: DateTime<Utc>) -> bool {
    lesson.unlock_date.map(|date| date <= now).unwrap_or(true)
}
