use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::card::Card;
use crate::model::ids::{CardId, LearnerId};

/// Highest difficulty step a record can reach.
pub const MAX_DIFFICULTY: u8 = 5;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("difficulty must be in 0..={MAX_DIFFICULTY}, got {0}")]
    DifficultyOutOfRange(u8),

    #[error("correct count ({correct}) exceeds review count ({reviews})")]
    CountMismatch { correct: u32, reviews: u32 },
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Durable learning state for one (learner, card) pair.
///
/// Records are created on first exposure and never deleted; every answer
/// produces an updated copy through the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    learner_id: LearnerId,
    card_id: CardId,
    difficulty: u8,
    review_count: u32,
    correct_count: u32,
    last_reviewed_at: Option<DateTime<Utc>>,
    next_review_at: DateTime<Utc>,
    is_learned: bool,
}

impl ProgressRecord {
    /// Fresh record for a card the learner has never seen. It is due immediately.
    #[must_use]
    pub fn new(learner_id: LearnerId, card_id: CardId, now: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            card_id,
            difficulty: 0,
            review_count: 0,
            correct_count: 0,
            last_reviewed_at: None,
            next_review_at: now,
            is_learned: false,
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the stored values break the record invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        card_id: CardId,
        difficulty: u8,
        review_count: u32,
        correct_count: u32,
        last_reviewed_at: Option<DateTime<Utc>>,
        next_review_at: DateTime<Utc>,
        is_learned: bool,
    ) -> Result<Self, ProgressError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ProgressError::DifficultyOutOfRange(difficulty));
        }
        if correct_count > review_count {
            return Err(ProgressError::CountMismatch {
                correct: correct_count,
                reviews: review_count,
            });
        }

        Ok(Self {
            learner_id,
            card_id,
            difficulty,
            review_count,
            correct_count,
            last_reviewed_at,
            next_review_at,
            is_learned,
        })
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn card_id(&self) -> CardId {
        self.card_id
    }

    #[must_use]
    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    #[must_use]
    pub fn review_count(&self) -> u32 {
        self.review_count
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.last_reviewed_at
    }

    #[must_use]
    pub fn next_review_at(&self) -> DateTime<Utc> {
        self.next_review_at
    }

    #[must_use]
    pub fn is_learned(&self) -> bool {
        self.is_learned
    }

    /// True once the record has been answered at least once.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.review_count > 0
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_learned && self.next_review_at <= now
    }

    /// Share of correct answers in `[0, 1]`; `None` before the first review.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        (self.review_count > 0)
            .then(|| f64::from(self.correct_count) / f64::from(self.review_count))
    }

    pub(crate) fn record_answer(
        &mut self,
        is_correct: bool,
        difficulty: u8,
        reviewed_at: DateTime<Utc>,
        next_review_at: DateTime<Utc>,
    ) {
        self.difficulty = difficulty.min(MAX_DIFFICULTY);
        self.review_count = self.review_count.saturating_add(1);
        if is_correct {
            self.correct_count = self.correct_count.saturating_add(1);
        }
        self.last_reviewed_at = Some(reviewed_at);
        self.next_review_at = next_review_at;
    }

    pub(crate) fn mark_learned(&mut self) {
        self.is_learned = true;
    }
}

//
// ─── STUDY CARD ────────────────────────────────────────────────────────────────
//

/// A progress record joined with the card it tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyCard {
    pub progress: ProgressRecord,
    pub card: Card,
}

impl StudyCard {
    #[must_use]
    pub fn new(progress: ProgressRecord, card: Card) -> Self {
        Self { progress, card }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
