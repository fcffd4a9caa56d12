use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{CardId, LearnerId, SessionId};
use crate::model::progress::{ProgressRecord, StudyCard};
use crate::reporting::accuracy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("a session needs at least one card")]
    Empty,

    #[error("session already completed")]
    Completed,

    #[error("answer targets card {got} but the current card is {expected}")]
    CardMismatch { expected: CardId, got: CardId },
}

/// Aggregated view of session progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub completed: u32,
    pub correct: u32,
    pub remaining: usize,
    pub accuracy: f64,
}

/// One study pass over a fixed snapshot of cards.
///
/// The queue is owned and never reallocated after creation; the current card
/// is always derived from `cursor`.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    learner_id: LearnerId,
    queue: Vec<StudyCard>,
    cursor: usize,
    cards_completed: u32,
    correct_answers: u32,
    started_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl Session {
    /// Start a session over `queue`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Empty` if the queue has no cards.
    pub fn new(
        learner_id: LearnerId,
        queue: Vec<StudyCard>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if queue.is_empty() {
            return Err(SessionStateError::Empty);
        }

        Ok(Self {
            id: SessionId::random(),
            learner_id,
            queue,
            cursor: 0,
            cards_completed: 0,
            correct_answers: 0,
            started_at,
            last_active_at: started_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn queue(&self) -> &[StudyCard] {
        &self.queue
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn cards_completed(&self) -> u32 {
        self.cards_completed
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.cursor)
    }

    #[must_use]
    pub fn current(&self) -> Option<&StudyCard> {
        self.queue.get(self.cursor)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// True when the session has been idle for longer than `ttl`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.last_active_at) > ttl
    }

    /// Records in the queue that have been answered at least once.
    pub fn touched(&self) -> impl Iterator<Item = &ProgressRecord> + '_ {
        self.queue
            .iter()
            .map(|item| &item.progress)
            .filter(|record| record.is_touched())
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        accuracy(self.correct_answers, self.cards_completed)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.queue.len(),
            completed: self.cards_completed,
            correct: self.correct_answers,
            remaining: self.remaining(),
            accuracy: self.accuracy(),
        }
    }

    /// Store the already-persisted update for the current card and move on.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` past the end of the queue and
    /// `SessionStateError::CardMismatch` if `updated` is not the current card.
    pub fn commit_answer(
        &mut self,
        updated: ProgressRecord,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        let Some(slot) = self.queue.get_mut(self.cursor) else {
            return Err(SessionStateError::Completed);
        };
        if slot.progress.card_id() != updated.card_id() {
            return Err(SessionStateError::CardMismatch {
                expected: slot.progress.card_id(),
                got: updated.card_id(),
            });
        }

        slot.progress = updated;
        self.cards_completed = self.cards_completed.saturating_add(1);
        if is_correct {
            self.correct_answers = self.correct_answers.saturating_add(1);
        }
        self.cursor += 1;
        self.last_active_at = answered_at;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
