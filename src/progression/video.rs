//! VideoProgressTracker: watch-percentage and resume-position rules.
//!
//! The stored watch percentage only ever grows; rewinding never lowers it.
//! The resume position is a plain overwrite and never gates anything.

use crate::progression::types::Lesson;

/// Minimum watched percentage for lessons with `video_watch_required`.
pub const WATCH_REQUIREMENT_PERCENT: i32 = 80;

pub fn clamp_percent(percent: i32) -> i32 {
    percent.clamp(0, 100)
}

/// Clamp a player-reported percentage to 0..=100, truncating any fraction.
/// Non-finite reports count as zero.
pub fn clamp_reported_percent(percent: f64) -> i32 {
    if !percent.is_finite() {
        return 0;
    }
    percent.clamp(0.0, 100.0) as i32
}

pub fn meets_watch_requirement(lesson: &Lesson, stored_percent: i32) -> bool {
    !lesson.video_watch_required || stored_percent >= WATCH_REQUIREMENT_PERCENT
}

/// Approximate watched percentage for externally-hosted players where true
/// playback position cannot be observed (cross-origin embeds). Estimated
/// from elapsed wall-clock time against the lesson's expected duration, so
/// it over-counts paused time; a known inaccuracy, fed through the same
/// recording contract as measured progress.
pub fn estimate_watched_percent(elapsed_secs: i64, expected_duration_secs: i32) -> i32 {
    if expected_duration_secs <= 0 {
        return 0;
    }
    let percent = elapsed_secs.saturating_mul(100) / i64::from(expected_duration_secs);
    clamp_percent(percent.min(i64::from(i32::MAX)) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn video_lesson(required: bool) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            title: "Hurdada Ilmaha".to_string(),
            lesson_type: "video".to_string(),
            module_number: 1,
            lesson_order: 1,
            video_url: Some("https://player.example/v/123".to_string()),
            video_watch_required: required,
            expected_duration_secs: Some(600),
            unlock_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(clamp_percent(-5), 0);
        assert_eq!(clamp_percent(42), 42);
        assert_eq!(clamp_percent(130), 100);
    }

    #[test]
    fn test_reported_percent_truncates_and_clamps() {
        assert_eq!(clamp_reported_percent(79.5), 79);
        assert_eq!(clamp_reported_percent(-0.5), 0);
        assert_eq!(clamp_reported_percent(100.0001), 100);
        assert_eq!(clamp_reported_percent(f64::NAN), 0);
        assert_eq!(clamp_reported_percent(f64::INFINITY), 0);
    }

    #[test]
    fn test_watch_requirement_threshold() {
        let l = video_lesson(true);
        assert!(!meets_watch_requirement(&l, 79));
        assert!(meets_watch_requirement(&l, 80));
        assert!(meets_watch_requirement(&l, 100));
    }

    #[test]
    fn test_no_requirement_always_met() {
        let l = video_lesson(false);
        assert!(meets_watch_requirement(&l, 0));
    }

    #[test]
    fn test_estimate_is_proportional_and_capped() {
        assert_eq!(estimate_watched_percent(300, 600), 50);
        assert_eq!(estimate_watched_percent(900, 600), 100);
        assert_eq!(estimate_watched_percent(0, 600), 0);
    }

    #[test]
    fn test_estimate_with_unknown_duration_is_zero() {
        assert_eq!(estimate_watched_percent(300, 0), 0);
    }
}
