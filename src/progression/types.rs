//! Database schema and data models for lesson progression.
//!
//! Courses own an ordered list of lessons (`module_number`, then
//! `lesson_order`); `lesson_progress` holds one row per (parent, lesson)
//! pair. Enrollments are written by the billing subsystem and read here.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// DATABASE SCHEMA
// ============================================================================

diesel::table! {
    courses (id) {
        id -> Uuid,
        slug -> Text,
        title -> Text,
        is_free -> Bool,
        is_live -> Bool,
        max_per_day -> Nullable<Int4>,
        max_per_week -> Nullable<Int4>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    lessons (id) {
        id -> Uuid,
        course_id -> Uuid,
        title -> Text,
        lesson_type -> Text,
        module_number -> Int4,
        lesson_order -> Int4,
        video_url -> Nullable<Text>,
        video_watch_required -> Bool,
        expected_duration_secs -> Nullable<Int4>,
        unlock_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    enrollments (id) {
        id -> Uuid,
        parent_id -> Uuid,
        course_id -> Nullable<Uuid>,
        status -> Text,
        access_end -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    lesson_progress (id) {
        id -> Uuid,
        parent_id -> Uuid,
        lesson_id -> Uuid,
        course_id -> Uuid,
        completed -> Bool,
        completed_at -> Nullable<Timestamptz>,
        video_watched_percent -> Int4,
        video_position_secs -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    badge_awards (id) {
        id -> Uuid,
        parent_id -> Uuid,
        badge_id -> Text,
        awarded_at -> Timestamptz,
    }
}

diesel::table! {
    certificates (id) {
        id -> Uuid,
        parent_id -> Uuid,
        course_id -> Uuid,
        issued_at -> Timestamptz,
        verification_code -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    courses,
    lessons,
    enrollments,
    lesson_progress,
    badge_awards,
    certificates,
);

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = courses)]
pub struct Course {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub is_free: bool,
    pub is_live: bool,
    pub max_per_day: Option<i32>,
    pub max_per_week: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Pacing caps, when the course carries any. `None` means unlimited.
    pub fn pacing_policy(&self) -> Option<PacingPolicy> {
        if self.max_per_day.is_none() && self.max_per_week.is_none() {
            return None;
        }
        Some(PacingPolicy {
            max_per_day: self.max_per_day,
            max_per_week: self.max_per_week,
        })
    }
}

/// Course-level completion caps. A missing axis is unlimited on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub max_per_day: Option<i32>,
    pub max_per_week: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = lessons)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub lesson_type: String,
    pub module_number: i32,
    pub lesson_order: i32,
    pub video_url: Option<String>,
    pub video_watch_required: bool,
    pub expected_duration_secs: Option<i32>,
    pub unlock_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lesson {
    /// Position key defining the total order within a course.
    pub fn position(&self) -> (i32, i32) {
        (self.module_number, self.lesson_order)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    Video,
    Quiz,
    Assignment,
    Sawirro,
    Audio,
    Live,
}

impl From<&str> for LessonType {
    fn from(s: &str) -> Self {
        match s {
            "quiz" => Self::Quiz,
            "assignment" => Self::Assignment,
            "sawirro" => Self::Sawirro,
            "audio" => Self::Audio,
            "live" => Self::Live,
            _ => Self::Video,
        }
    }
}

impl std::fmt::Display for LessonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Quiz => write!(f, "quiz"),
            Self::Assignment => write!(f, "assignment"),
            Self::Sawirro => write!(f, "sawirro"),
            Self::Audio => write!(f, "audio"),
            Self::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = enrollments)]
pub struct Enrollment {
    pub id: Uuid,
    pub parent_id: Uuid,
    /// `None` marks an all-access enrollment, valid for any live course.
    pub course_id: Option<Uuid>,
    pub status: String,
    pub access_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == "active" && self.access_end.map(|end| end > now).unwrap_or(true)
    }

    pub fn is_all_access(&self) -> bool {
        self.course_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Expired,
    Cancelled,
}

impl From<&str> for EnrollmentStatus {
    fn from(s: &str) -> Self {
        match s {
            "expired" => Self::Expired,
            "cancelled" => Self::Cancelled,
            _ => Self::Active,
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = lesson_progress)]
pub struct LessonProgress {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub lesson_id: Uuid,
    pub course_id: Uuid,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub video_watched_percent: i32,
    pub video_position_secs: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = badge_awards)]
pub struct BadgeAward {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub badge_id: String,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = certificates)]
pub struct Certificate {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub course_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub verification_code: String,
}

// ============================================================================
// WIRE TYPES
// ============================================================================
// Field names are camelCase: this is the contract the platform client
// renders from.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_slug: String,
    pub title: String,
    pub lesson_type: String,
    pub module_number: i32,
    pub lesson_order: i32,
    pub video_url: Option<String>,
    pub video_watch_required: bool,
    pub unlock_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub video_watched_percent: i32,
    pub video_position_secs: i32,
}

impl LessonView {
    pub fn from_parts(lesson: &Lesson, course: &Course, progress: Option<&LessonProgress>) -> Self {
        Self {
            id: lesson.id,
            course_id: lesson.course_id,
            course_slug: course.slug.clone(),
            title: lesson.title.clone(),
            lesson_type: lesson.lesson_type.clone(),
            module_number: lesson.module_number,
            lesson_order: lesson.lesson_order,
            video_url: lesson.video_url.clone(),
            video_watch_required: lesson.video_watch_required,
            unlock_date: lesson.unlock_date,
            completed: progress.map(|p| p.completed).unwrap_or(false),
            video_watched_percent: progress.map(|p| p.video_watched_percent).unwrap_or(0),
            video_position_secs: progress.map(|p| p.video_position_secs).unwrap_or(0),
        }
    }
}

/// Non-blocking unlock report for UI countdowns. Never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockStatus {
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_date: Option<DateTime<Utc>>,
}

/// Watch-progress report. Players that can observe playback send `percent`
/// (fractional values are accepted and truncated); cross-origin embeds that
/// cannot send `elapsedSecs` instead and the percentage is estimated from
/// the lesson's expected duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgressRequest {
    pub percent: Option<f64>,
    pub elapsed_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPositionRequest {
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgressResponse {
    pub video_watched_percent: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub awarded_badges: Vec<String>,
    pub course_completed: bool,
    pub certificate_issued: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingResponse {
    pub lessons_today: i64,
    pub max_per_day: Option<i32>,
    pub lessons_this_week: i64,
    pub max_per_week: Option<i32>,
    pub can_access_lesson: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
