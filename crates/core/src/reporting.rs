//! Read-only derivations over sessions and aggregate progress.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Estimated seconds a learner spends on one card.
pub const SECONDS_PER_CARD: u64 = 30;

/// Percentage of correct answers; zero completed answers count as one.
#[must_use]
pub fn accuracy(correct: u32, completed: u32) -> f64 {
    f64::from(correct) / f64::from(completed.max(1)) * 100.0
}

/// Coarse duration until the next card becomes eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", content = "value", rename_all = "lowercase")]
pub enum WaitBucket {
    Minutes(i64),
    Hours(i64),
    Days(i64),
}

impl WaitBucket {
    #[must_use]
    pub fn from_duration(left: Duration) -> Self {
        if left < Duration::hours(1) {
            WaitBucket::Minutes(left.num_minutes())
        } else if left < Duration::days(1) {
            WaitBucket::Hours(left.num_hours())
        } else {
            WaitBucket::Days(left.num_days())
        }
    }
}

/// What the learner should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StudyRecommendation {
    /// Cards are due now; `minutes` is the estimated study time.
    Study { minutes: u64, due: u64 },
    /// Nothing is due; the nearest card unlocks after this wait.
    NextReviewIn { wait: WaitBucket },
    NothingToReview,
}

/// Recommend study time from the due count and the nearest future review.
#[must_use]
pub fn recommend(
    due: u64,
    next_review_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> StudyRecommendation {
    if due > 0 {
        let minutes = (due * SECONDS_PER_CARD / 60).max(1);
        return StudyRecommendation::Study { minutes, due };
    }

    match next_review_at.map(|at| at.signed_duration_since(now)) {
        Some(left) if left > Duration::zero() => StudyRecommendation::NextReviewIn {
            wait: WaitBucket::from_duration(left),
        },
        _ => StudyRecommendation::NothingToReview,
    }
}

impl fmt::Display for WaitBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitBucket::Minutes(n) => write!(f, "{n} min"),
            WaitBucket::Hours(n) => write!(f, "{n} h"),
            WaitBucket::Days(n) => write!(f, "{n} days"),
        }
    }
}

impl fmt::Display for StudyRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudyRecommendation::Study { minutes, due } => {
                write!(f, "Recommended study time: {minutes} min ({due} cards)")
            }
            StudyRecommendation::NextReviewIn { wait } => {
                write!(f, "Next card will be available in {wait}")
            }
            StudyRecommendation::NothingToReview => f.write_str("Nothing to review today!"),
        }
    }
}
