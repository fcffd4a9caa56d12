use chrono::{DateTime, Utc};
use serde::Serialize;

use lingua_core::model::{CardId, LearnerId, Level, Session, SessionId, SessionProgress, StudyCard};
use lingua_core::reporting::StudyRecommendation;
use storage::repository::ProgressStats;

/// Presentation-agnostic card shown to a learner.
///
/// No pre-formatted strings; the chat layer decides how to render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub card_id: CardId,
    pub front_text: String,
    pub back_text: String,
    pub example: String,
    pub level: Level,
    pub category: String,
    pub difficulty: u8,
    pub review_count: u32,
    /// 1-based position within the session queue.
    pub position: usize,
    pub total: usize,
}

impl CardView {
    #[must_use]
    pub fn from_study_card(item: &StudyCard, position: usize, total: usize) -> Self {
        Self {
            card_id: item.card.id(),
            front_text: item.card.front_text().to_owned(),
            back_text: item.card.back_text().to_owned(),
            example: item.card.example().to_owned(),
            level: item.card.level(),
            category: item.card.category().to_owned(),
            difficulty: item.progress.difficulty(),
            review_count: item.progress.review_count(),
            position,
            total,
        }
    }

    /// Current card of `session`, if any remain.
    #[must_use]
    pub fn current(session: &Session) -> Option<Self> {
        session
            .current()
            .map(|item| Self::from_study_card(item, session.cursor() + 1, session.len()))
    }
}

/// Snapshot of an active session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub learner_id: LearnerId,
    pub started_at: DateTime<Utc>,
    pub progress: SessionProgress,
    pub current: Option<CardView>,
}

impl SessionView {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            learner_id: session.learner_id(),
            started_at: session.started_at(),
            progress: session.progress(),
            current: CardView::current(session),
        }
    }
}

/// Learner-level statistics combining stored progress with the live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnerStats {
    pub learner_id: LearnerId,
    pub total: u64,
    pub due_count: u64,
    pub learned_count: u64,
    /// Mean per-card accuracy over reviewed cards, in percent.
    pub accuracy: f64,
    pub active_session: bool,
    pub session: Option<SessionProgress>,
    pub recommendation: StudyRecommendation,
}

impl LearnerStats {
    #[must_use]
    pub fn new(
        learner_id: LearnerId,
        stored: ProgressStats,
        session: Option<SessionProgress>,
        recommendation: StudyRecommendation,
    ) -> Self {
        Self {
            learner_id,
            total: stored.total,
            due_count: stored.due,
            learned_count: stored.learned,
            accuracy: stored.accuracy,
            active_session: session.is_some(),
            session,
            recommendation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingua_core::model::{Card, ProgressRecord};
    use lingua_core::time::fixed_now;

    fn session_of(n: u64) -> Session {
        let queue = (1..=n)
            .map(|id| {
                let card = Card::new(
                    CardId::new(id),
                    format!("word {id}"),
                    format!("meaning {id}"),
                    "",
                    Level::Beginner,
                    "food",
                )
                .unwrap();
                let record = ProgressRecord::new(LearnerId::new(9), card.id(), fixed_now());
                StudyCard::new(record, card)
            })
            .collect();
        Session::new(LearnerId::new(9), queue, fixed_now()).unwrap()
    }

    #[test]
    fn session_view_points_at_first_card() {
        let session = session_of(3);
        let view = SessionView::from_session(&session);

        assert_eq!(view.progress.total, 3);
        assert_eq!(view.progress.remaining, 3);
        let current = view.current.expect("current card");
        assert_eq!(current.card_id, CardId::new(1));
        assert_eq!(current.position, 1);
        assert_eq!(current.total, 3);
        assert_eq!(current.category, "food");
    }

    #[test]
    fn stats_serialize_with_tagged_recommendation() {
        let stats = LearnerStats::new(
            LearnerId::new(9),
            ProgressStats::empty(),
            None,
            StudyRecommendation::NothingToReview,
        );
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["active_session"], false);
        assert_eq!(json["recommendation"]["kind"], "nothing_to_review");
        assert!(json["session"].is_null());
    }
}
