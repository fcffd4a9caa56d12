use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors raised while validating a learner's answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("invalid rating: {0:?} (expected easy, good, hard or forgot)")]
    InvalidRating(String),

    #[error("\"forgot\" cannot rate a correct answer")]
    ForgotOnCorrect,
}

//
// ─── RATING ───────────────────────────────────────────────────────────────────
//

/// Self-rated perceived difficulty attached to an answer.
///
/// - `Easy`: recalled instantly, interval stretched
/// - `Good`: recalled normally, interval unchanged
/// - `Hard`: recalled with effort, interval shortened
/// - `Forgot`: not recalled; only valid on incorrect answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Easy,
    Good,
    Hard,
    Forgot,
}

impl Rating {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Easy => "easy",
            Rating::Good => "good",
            Rating::Hard => "hard",
            Rating::Forgot => "forgot",
        }
    }

    /// Multiplier applied to the base interval of a correct answer.
    #[must_use]
    pub fn interval_multiplier(self) -> f64 {
        match self {
            Rating::Easy => 1.5,
            Rating::Hard => 0.7,
            Rating::Good | Rating::Forgot => 1.0,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Rating::Easy),
            "good" => Ok(Rating::Good),
            "hard" => Ok(Rating::Hard),
            "forgot" => Ok(Rating::Forgot),
            _ => Err(ReviewError::InvalidRating(s.to_owned())),
        }
    }
}

//
// ─── ANSWER ───────────────────────────────────────────────────────────────────
//

/// A validated answer, ready for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Correct(Rating),
    Incorrect,
}

impl Answer {
    /// Pair correctness with a rating.
    ///
    /// The rating of an incorrect answer carries no scheduling weight and is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::ForgotOnCorrect` for a correct answer rated `Forgot`.
    pub fn new(is_correct: bool, rating: Rating) -> Result<Self, ReviewError> {
        match (is_correct, rating) {
            (true, Rating::Forgot) => Err(ReviewError::ForgotOnCorrect),
            (true, rating) => Ok(Answer::Correct(rating)),
            (false, _) => Ok(Answer::Incorrect),
        }
    }

    #[must_use]
    pub fn is_correct(self) -> bool {
        matches!(self, Answer::Correct(_))
    }
}

//
// ─── ANSWER OUTCOME ──────────────────────────────────────────────────────────
//

/// What the scheduler decided for one answer.
///
/// `base_interval` is the table value before jitter; `next_review_interval`
/// is what was actually scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub new_difficulty: u8,
    #[serde(with = "duration_secs")]
    pub base_interval: Duration,
    #[serde(with = "duration_secs")]
    pub next_review_interval: Duration,
    pub next_review_at: DateTime<Utc>,
    pub is_learned: bool,
}

mod duration_secs {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_parsing_is_case_insensitive() {
        assert_eq!("EASY".parse::<Rating>().unwrap(), Rating::Easy);
        assert_eq!(" forgot ".parse::<Rating>().unwrap(), Rating::Forgot);
        let err = "meh".parse::<Rating>().unwrap_err();
        assert!(matches!(err, ReviewError::InvalidRating(s) if s == "meh"));
    }

    #[test]
    fn forgot_cannot_rate_a_correct_answer() {
        assert_eq!(
            Answer::new(true, Rating::Forgot).unwrap_err(),
            ReviewError::ForgotOnCorrect
        );
        assert_eq!(Answer::new(false, Rating::Easy).unwrap(), Answer::Incorrect);
        assert_eq!(
            Answer::new(true, Rating::Hard).unwrap(),
            Answer::Correct(Rating::Hard)
        );
    }

    #[test]
    fn multipliers_match_rating() {
        assert!((Rating::Easy.interval_multiplier() - 1.5).abs() < f64::EPSILON);
        assert!((Rating::Good.interval_multiplier() - 1.0).abs() < f64::EPSILON);
        assert!((Rating::Hard.interval_multiplier() - 0.7).abs() < f64::EPSILON);
    }
}
