use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;

use crate::model::{Answer, AnswerOutcome, MAX_DIFFICULTY, ProgressRecord};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("jitter bounds must satisfy 0 < min <= max, got [{min}, {max}]")]
    InvalidJitter { min: f64, max: f64 },
    #[error("learned accuracy threshold must be in (0, 1], got {provided}")]
    InvalidLearnedAccuracy { provided: f64 },
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Tunables for the scheduler.
///
/// Defaults: jitter in `[0.8, 1.2]`, a card counts as learned after 3 reviews
/// with at least 70% correct.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub jitter_min: f64,
    pub jitter_max: f64,
    pub learned_min_reviews: u32,
    pub learned_min_accuracy: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jitter_min: 0.8,
            jitter_max: 1.2,
            learned_min_reviews: 3,
            learned_min_accuracy: 0.7,
        }
    }
}

/// Re-exposure delay after an incorrect answer, regardless of difficulty.
pub const RELEARN_INTERVAL_MINUTES: i64 = 10;

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Result of applying one answer: the updated record and what was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedAnswer {
    pub record: ProgressRecord,
    pub outcome: AnswerOutcome,
}

/// Difficulty-step scheduler in the SM-2 family.
///
/// Correct answers raise difficulty by one (capped at 5) and pick an interval
/// from a fixed table, rescaled by the learner's rating:
///
/// | difficulty | interval |
/// |-----------:|---------:|
/// | 0, 1       | 1 day    |
/// | 2          | 3 days   |
/// | 3          | 7 days   |
/// | 4          | 14 days  |
/// | 5          | 30 days  |
///
/// Incorrect answers lower difficulty by one (floored at 0) and bring the card
/// back after ten minutes. A jitter factor is applied in both cases so cards
/// reviewed together do not all come due at the same instant.
///
/// The scheduler never persists and never reads the wall clock; `now` and the
/// random source are supplied by the caller.
///
/// # Examples
///
/// ```
/// # use lingua_core::scheduler::Scheduler;
/// # use lingua_core::model::{Answer, CardId, LearnerId, ProgressRecord, Rating};
/// # use lingua_core::time::fixed_now;
/// let scheduler = Scheduler::new();
/// let record = ProgressRecord::new(LearnerId::new(1), CardId::new(1), fixed_now());
/// let applied = scheduler.advance_with_jitter(
///     &record,
///     Answer::Correct(Rating::Good),
///     fixed_now(),
///     1.0,
/// );
/// assert_eq!(applied.outcome.new_difficulty, 1);
/// assert_eq!(applied.outcome.next_review_interval, chrono::Duration::days(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scheduler with custom tunables.
    ///
    /// # Errors
    ///
    /// - `InvalidJitter` if the bounds are non-finite, non-positive, or inverted
    /// - `InvalidLearnedAccuracy` if the threshold is outside `(0, 1]`
    pub fn try_with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let SchedulerConfig {
            jitter_min,
            jitter_max,
            learned_min_accuracy,
            ..
        } = config;

        if !jitter_min.is_finite()
            || !jitter_max.is_finite()
            || jitter_min <= 0.0
            || jitter_min > jitter_max
        {
            return Err(SchedulerError::InvalidJitter {
                min: jitter_min,
                max: jitter_max,
            });
        }
        if !(learned_min_accuracy > 0.0 && learned_min_accuracy <= 1.0) {
            return Err(SchedulerError::InvalidLearnedAccuracy {
                provided: learned_min_accuracy,
            });
        }

        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Difficulty after applying `answer` to a record at `difficulty`.
    #[must_use]
    pub fn next_difficulty(difficulty: u8, answer: Answer) -> u8 {
        match answer {
            Answer::Correct(_) => difficulty.saturating_add(1).min(MAX_DIFFICULTY),
            Answer::Incorrect => difficulty.saturating_sub(1),
        }
    }

    /// Pre-jitter interval for an answer that lands on `new_difficulty`.
    #[must_use]
    pub fn base_interval(new_difficulty: u8, answer: Answer) -> Duration {
        match answer {
            Answer::Correct(rating) => {
                let days = match new_difficulty {
                    0 | 1 => 1,
                    2 => 3,
                    3 => 7,
                    4 => 14,
                    _ => 30,
                };
                scale(Duration::days(days), rating.interval_multiplier())
            }
            Answer::Incorrect => Duration::minutes(RELEARN_INTERVAL_MINUTES),
        }
    }

    /// Draw a jitter factor from the configured range.
    pub fn sample_jitter<R: Rng>(&self, rng: &mut R) -> f64 {
        rng.random_range(self.config.jitter_min..=self.config.jitter_max)
    }

    /// Apply an answer using jitter drawn from `rng`.
    pub fn advance<R: Rng>(
        &self,
        record: &ProgressRecord,
        answer: Answer,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> AppliedAnswer {
        let jitter = self.sample_jitter(rng);
        self.advance_with_jitter(record, answer, now, jitter)
    }

    /// Apply an answer with an explicit jitter factor.
    ///
    /// The factor is clamped into the configured range.
    #[must_use]
    pub fn advance_with_jitter(
        &self,
        record: &ProgressRecord,
        answer: Answer,
        now: DateTime<Utc>,
        jitter: f64,
    ) -> AppliedAnswer {
        let jitter = if jitter.is_finite() {
            jitter.clamp(self.config.jitter_min, self.config.jitter_max)
        } else {
            1.0_f64.clamp(self.config.jitter_min, self.config.jitter_max)
        };

        let new_difficulty = Self::next_difficulty(record.difficulty(), answer);
        let base_interval = Self::base_interval(new_difficulty, answer);
        let interval = scale(base_interval, jitter);
        let next_review_at = now + interval;

        let mut updated = record.clone();
        updated.record_answer(answer.is_correct(), new_difficulty, now, next_review_at);
        if !updated.is_learned() && self.crosses_learned_threshold(&updated) {
            updated.mark_learned();
        }

        let outcome = AnswerOutcome {
            is_correct: answer.is_correct(),
            new_difficulty,
            base_interval,
            next_review_interval: interval,
            next_review_at,
            is_learned: updated.is_learned(),
        };

        AppliedAnswer {
            record: updated,
            outcome,
        }
    }

    fn crosses_learned_threshold(&self, record: &ProgressRecord) -> bool {
        record.review_count() >= self.config.learned_min_reviews
            && record
                .accuracy()
                .is_some_and(|acc| acc + f64::EPSILON >= self.config.learned_min_accuracy)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scale(interval: Duration, factor: f64) -> Duration {
    let millis = (interval.num_milliseconds() as f64 * factor).round() as i64;
    Duration::milliseconds(millis)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
