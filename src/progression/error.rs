//! Typed outcomes for the progression engine.
//!
//! Every denial is a variant of a closed enum carrying the concrete datum
//! the client needs to recover (the predecessor lesson, the unlock date,
//! the cap reset instant). Callers branch on kind, never on message text.
//! Infrastructure faults are a separate category and the only one a client
//! should treat as transient.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Expected business outcomes that block a request. Not system failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Denial {
    #[error("Sign in to access lessons")]
    Unauthenticated,
    #[error("No active enrollment for this course")]
    AccessDenied { course_slug: String },
    #[error("Complete \"{previous_lesson_title}\" first")]
    PrerequisiteIncomplete {
        previous_lesson_id: Uuid,
        previous_lesson_title: String,
        course_slug: String,
    },
    #[error("This lesson unlocks on {unlock_date}")]
    ScheduleLocked {
        unlock_date: DateTime<Utc>,
        course_slug: String,
    },
    #[error("Watch at least 80% of the video before completing this lesson")]
    VideoIncomplete,
    #[error("Daily lesson limit reached, try again after {resets_at}")]
    DailyLimitReached { resets_at: DateTime<Utc> },
    #[error("Weekly lesson limit reached, try again after {resets_at}")]
    WeeklyLimitReached { resets_at: DateTime<Utc> },
}

impl Denial {
    /// Stable machine-readable code the client branches on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::PrerequisiteIncomplete { .. } => "PREREQUISITE_INCOMPLETE",
            Self::ScheduleLocked { .. } => "SCHEDULE_LOCKED",
            Self::VideoIncomplete => "VIDEO_INCOMPLETE",
            Self::DailyLimitReached { .. } => "DAILY_LIMIT_REACHED",
            Self::WeeklyLimitReached { .. } => "WEEKLY_LIMIT_REACHED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::VideoIncomplete => StatusCode::BAD_REQUEST,
            _ => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match &self {
            Denial::Unauthenticated => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
            }),
            Denial::AccessDenied { course_slug } => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
                "courseSlug": course_slug,
            }),
            Denial::PrerequisiteIncomplete {
                previous_lesson_id,
                previous_lesson_title,
                course_slug,
            } => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
                "previousLessonId": previous_lesson_id,
                "previousLessonTitle": previous_lesson_title,
                "courseSlug": course_slug,
            }),
            Denial::ScheduleLocked {
                unlock_date,
                course_slug,
            } => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
                "reason": self.to_string(),
                "unlockDate": unlock_date,
                "courseSlug": course_slug,
            }),
            Denial::VideoIncomplete => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
            }),
            Denial::DailyLimitReached { resets_at }
            | Denial::WeeklyLimitReached { resets_at } => serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
                "resetsAt": resets_at,
            }),
        };
        (status, Json(body)).into_response()
    }
}

/// Engine-level error: a business denial, a missing entity, or a genuine
/// infrastructure fault.
#[derive(Debug, thiserror::Error)]
pub enum ProgressionError {
    #[error(transparent)]
    Denied(#[from] Denial),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(#[from] crate::progression::store::StoreError),
}

impl IntoResponse for ProgressionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Denied(denial) => denial.into_response(),
            Self::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": msg })),
            )
                .into_response(),
            Self::Store(err) => {
                log::error!("store failure: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}
