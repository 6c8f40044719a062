//! Badge rule set evaluated after each completion.
//!
//! Rules read aggregate completion facts (totals and the consecutive-day
//! streak over distinct UTC completion dates). Awarding itself is guarded by
//! the store's uniqueness constraint, so re-evaluating an already-earned
//! rule is harmless.

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy)]
pub struct BadgeRule {
    pub id: &'static str,
    pub title: &'static str,
    pub kind: BadgeKind,
}

#[derive(Debug, Clone, Copy)]
pub enum BadgeKind {
    /// Lessons completed across all courses.
    TotalLessons(i64),
    /// Consecutive calendar days (UTC) with at least one completion,
    /// counting back from today.
    DailyStreak(i64),
}

const RULES: &[BadgeRule] = &[
    BadgeRule {
        id: "first-lesson",
        title: "First Lesson",
        kind: BadgeKind::TotalLessons(1),
    },
    BadgeRule {
        id: "ten-lessons",
        title: "Ten Lessons",
        kind: BadgeKind::TotalLessons(10),
    },
    BadgeRule {
        id: "fifty-lessons",
        title: "Fifty Lessons",
        kind: BadgeKind::TotalLessons(50),
    },
    BadgeRule {
        id: "week-streak",
        title: "Seven-Day Streak",
        kind: BadgeKind::DailyStreak(7),
    },
];

pub fn rules() -> &'static [BadgeRule] {
    RULES
}

impl BadgeRule {
    pub fn earned(&self, total_completed: i64, streak_days: i64) -> bool {
        match self.kind {
            BadgeKind::TotalLessons(n) => total_completed >= n,
            BadgeKind::DailyStreak(n) => streak_days >= n,
        }
    }
}

/// Length of the streak ending today. `dates` holds distinct completion
/// dates sorted descending.
pub fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> i64 {
    let mut streak = 0;
    let mut expected = today;
    for &date in dates {
        if date == expected {
            streak += 1;
            expected = expected.pred_opt().unwrap_or(expected);
        } else if date < expected {
            break;
        }
    }
    streak
}
