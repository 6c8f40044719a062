//! PacingGuard: daily and weekly completion caps.
//!
//! Caps are a pacing rule for a scheduled curriculum, not a security
//! boundary: a denial always names which cap was hit and when it resets.
//! Day and week boundaries are evaluated in UTC for the whole system, weeks
//! starting Monday (ISO). The decision here is pure; the store performs it
//! inside the same transaction as the completion write so concurrent
//! completions cannot jointly exceed a cap.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use crate::progression::error::Denial;
use crate::progression::types::PacingPolicy;

/// Completion counts for (parent, course) in the current day and week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacingCounts {
    pub today: i64,
    pub this_week: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacingDecision {
    Reserved,
    DailyLimitReached { resets_at: DateTime<Utc> },
    WeeklyLimitReached { resets_at: DateTime<Utc> },
}

impl PacingDecision {
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved)
    }

    pub fn into_denial(self) -> Option<Denial> {
        match self {
            Self::Reserved => None,
            Self::DailyLimitReached { resets_at } => {
                Some(Denial::DailyLimitReached { resets_at })
            }
            Self::WeeklyLimitReached { resets_at } => {
                Some(Denial::WeeklyLimitReached { resets_at })
            }
        }
    }
}

pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let monday =
        now.date_naive() - Duration::days(i64::from(now.weekday().num_days_from_monday()));
    monday.and_time(NaiveTime::MIN).and_utc()
}

/// First instant at which the daily cap no longer counts today's lessons.
pub fn next_day(now: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(now) + Duration::days(1)
}

/// First instant of the next ISO week.
pub fn next_week(now: DateTime<Utc>) -> DateTime<Utc> {
    start_of_week(now) + Duration::weeks(1)
}

/// Decide whether one more completion fits under the caps. The daily cap is
/// checked first so the learner sees the nearest reset.
pub fn evaluate(policy: &PacingPolicy, counts: PacingCounts, now: DateTime<Utc>) -> PacingDecision {
    if let Some(max_per_day) = policy.max_per_day {
        if counts.today >= i64::from(max_per_day) {
            return PacingDecision::DailyLimitReached {
                resets_at: next_day(now),
            };
        }
    }
    if let Some(max_per_week) = policy.max_per_week {
        if counts.this_week >= i64::from(max_per_week) {
            return PacingDecision::WeeklyLimitReached {
                resets_at: next_week(now),
            };
        }
    }
    PacingDecision::Reserved
}
